/*!

This is the long-form manual for `pairwise_priority` and `prioritize`.

## Stages

A project goes through the following stages. They can overlap: votes can be cast as soon
as a comparison exists, and items can still be added while voting is going on.

1. **Matrix generation.** For each criterion, every unordered pair of distinct items
   becomes one comparison. Generating again after adding items only creates the missing
   pairs, and the existing votes are kept.
2. **Pairwise voting.** Each participant casts one vote per comparison: `prefersA`,
   `prefersB` or `tie`. Voting again replaces the previous vote. When all the registered
   participants agree, the comparison is locked and further votes are rejected.
3. **Magnitude scoring.** Each participant rates each item for each criterion on the scale
   `1, 2, 3, 5, 8, 13, 21, 34, 55, 89`. The score is locked when everybody picked the same
   value.
4. **Calculation.** Once every comparison and every magnitude of both criteria is locked,
   the ranking can be computed. Asking earlier fails with the list of the phases that are
   not complete.

## Scoring

For each criterion, the win-count weight of an item is the number of points it earned
(1 per win, 0.5 per tie) divided by the number of locked comparisons it took part in.
The weighted value is `value magnitude x value weight`, the weighted complexity is
`complexity magnitude x complexity weight` and the score is their ratio.

Items are sorted by decreasing score. Equal scores are broken by:
 - higher value magnitude first
 - then lower complexity magnitude first
 - then title, ignoring case
 - then item identifier

An item that lost every complexity comparison has a weighted complexity of zero. The
`degenerateComplexity` rule decides what happens then:
 - `fail` (default): the calculation fails and names the item
 - `rankLast`: the item gets no score and is ranked after all the scored items

## Participants and facilitators

All the registered participants must agree for anything to lock. Adding a participant
keeps the decided comparisons but the open ones now also wait for the new vote. Removing a
participant discards their votes and may lock some open comparisons right away.

Facilitators can reset a comparison or a magnitude score (this clears the lock and all the
votes), move comparisons to another session and reassign all the pending comparisons of a
session.

## Session files

The `prioritize` program replays a session described in a JSON file and prints the ranking.

```json
{
  "outputSettings": {
    "projectName": "Roadmap",
    "outputPath": "roadmap_summary.json"
  },
  "rules": { "degenerateComplexity": "rankLast" },
  "items": [
    { "title": "Search", "description": "full text search" },
    { "title": "Export" }
  ],
  "itemsFile": "more_items.csv",
  "participants": [
    { "name": "Ana", "role": "product", "facilitator": true },
    { "name": "Bo", "role": "dev" }
  ],
  "ballots": [
    {
      "participant": "Ana", "criterion": "value",
      "itemA": "Search", "itemB": "Export", "choice": "prefersA"
    }
  ],
  "magnitudes": [
    { "participant": "Ana", "criterion": "value", "item": "Search", "value": 8 }
  ],
  "resets": [
    {
      "by": "Ana", "criterion": "value", "itemA": "Search", "itemB": "Export",
      "revotes": [
        {
          "participant": "Ana", "criterion": "value",
          "itemA": "Export", "itemB": "Search", "choice": "tie"
        }
      ]
    }
  ]
}
```

Notes:
- `itemsFile` is relative to the session file. It is a CSV file with the columns
  `title,description,acceptance_notes`, and a header row.
- ballots name their items by title. `itemA` and `itemB` can be given in any order, the
  choice is relative to the order given in the ballot.
- the ballots, then the magnitudes, then the resets are replayed in the order of the file.
  Each reset is followed by its own `revotes` (ballots) and `rescores` (magnitude scores),
  which are skipped when the reset itself is rejected.
- a reset entry with an `item` instead of `itemA`/`itemB` resets a magnitude score.
- a ballot or a score the engine rejects (locked comparison, value off the scale, ...) is
  logged and counted in the summary. Unknown names stop the replay.

## Output

The summary is a JSON document with the configuration, the progress and the ranking, with
the full provenance of each score. `--csv-out` also writes the ranking as CSV. With
`--store`, the final state of the project is saved as a JSON document in the given
directory.

`--events` prints every domain event as one line of JSON on the standard output. The
summary must then go to a file (`--out` or `outputPath`), otherwise the run is refused.

 */
