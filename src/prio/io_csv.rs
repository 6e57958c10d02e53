// Primitives for reading and writing CSV files.

use std::io::Write;

use crate::prio::*;

/// Reads items from a CSV file with the columns `title,description,acceptance_notes`.
///
/// The first row is a header. Only the title is mandatory.
pub fn read_items_csv(path: &str) -> PrioResult<Vec<ItemEntry>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut res: Vec<ItemEntry> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        debug!("read_items_csv: lineno: {:?} row: {:?}", lineno, line);
        let title = line.get(0).map(|s| s.trim()).unwrap_or("");
        if title.is_empty() {
            return CsvMissingTitleSnafu { lineno }.fail();
        }
        let optional = |idx: usize| {
            line.get(idx)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        res.push(ItemEntry {
            title: title.to_string(),
            description: optional(1),
            acceptance_notes: optional(2),
        });
    }
    info!("Read {} items from {}", res.len(), simplify_file_name(path));
    Ok(res)
}

/// Writes the ranking with the provenance of every score.
pub fn write_ranking<W: Write>(out: W, report: &PriorityReport) -> PrioResult<W> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record([
        "rank",
        "title",
        "final_score",
        "value_weight",
        "complexity_weight",
        "value_magnitude",
        "complexity_magnitude",
        "weighted_value",
        "weighted_complexity",
    ])
    .context(CsvWriteSnafu {})?;
    for r in report.results.iter() {
        wtr.write_record(&[
            r.rank.to_string(),
            r.title.clone(),
            r.final_score.map(|s| s.to_string()).unwrap_or_default(),
            r.value_weight.to_string(),
            r.complexity_weight.to_string(),
            r.value_magnitude.to_string(),
            r.complexity_magnitude.to_string(),
            r.weighted_value.to_string(),
            r.weighted_complexity.to_string(),
        ])
        .context(CsvWriteSnafu {})?;
    }
    wtr.into_inner()
        .map_err(|e| e.into_error())
        .context(FlushingCsvSnafu {})
}

pub fn write_ranking_csv(path: &str, report: &PriorityReport) -> PrioResult<()> {
    let file = fs::File::create(path).context(WritingFileSnafu { path })?;
    write_ranking(file, report)?;
    info!("Wrote the ranking to {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_items() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("items.csv");
        fs::write(
            &p,
            "title,description,acceptance_notes\nSearch,full text,\n  Export ,,csv and json\nAudit\n",
        )
        .unwrap();
        let items = read_items_csv(p.to_str().unwrap()).unwrap();
        assert_eq!(
            items,
            vec![
                ItemEntry {
                    title: "Search".to_string(),
                    description: Some("full text".to_string()),
                    acceptance_notes: None
                },
                ItemEntry {
                    title: "Export".to_string(),
                    description: None,
                    acceptance_notes: Some("csv and json".to_string())
                },
                ItemEntry {
                    title: "Audit".to_string(),
                    description: None,
                    acceptance_notes: None
                },
            ]
        );
    }

    #[test]
    fn missing_title() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("items.csv");
        fs::write(&p, "title,description\nSearch,x\n,no title\n").unwrap();
        match read_items_csv(p.to_str().unwrap()) {
            Err(PrioError::CsvMissingTitle { lineno }) => assert_eq!(lineno, 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn write_ranking_rows() {
        let report = PriorityReport {
            generation: 1,
            results: vec![ItemPriority {
                item: ItemId(1),
                title: "Search, v2".to_string(),
                value_weight: 1.0,
                complexity_weight: 0.5,
                value_magnitude: Magnitude::new(8).unwrap(),
                complexity_magnitude: Magnitude::new(5).unwrap(),
                weighted_value: 8.0,
                weighted_complexity: 2.5,
                final_score: Some(3.2),
                rank: 1,
            }],
        };
        let out = write_ranking(Vec::new(), &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1,\"Search, v2\",3.2,1,0.5,8,5,8,2.5");
    }
}
