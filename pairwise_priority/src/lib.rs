/*!
Group consensus and priority scoring for pairwise feature prioritization.

A group of participants compares every pair of items (features) on two criteria,
business value and implementation complexity, and rates each item on an absolute
magnitude scale for both criteria. A comparison or a magnitude score is only decided
(locked) when all the participants agree. Once everything is locked, the win counts
and the magnitudes are combined into a Final Priority Score:

```text
score = (value magnitude x value weight) / (complexity magnitude x complexity weight)
```

where the weight of an item for a criterion is the fraction of the points it earned in
the locked comparisons of that criterion (win 1, tie 0.5, loss 0).

```
use pairwise_priority::builder::Builder;
use pairwise_priority::*;

let mut builder = Builder::new("roadmap", &ScoringRules::DEFAULT_RULES)?
    .items(&["Search".to_string(), "Export".to_string()])?;
builder.add_participant("Ana", "product", true);
let project = builder.build()?;

let ana = project.participants()[0].id;
let search = project.item_by_title("Search").map(|i| i.id).unwrap();
let export = project.item_by_title("Export").map(|i| i.id).unwrap();
for criterion in Criterion::ALL {
    let id = project.comparison_for(criterion, export, search).unwrap();
    project.submit_vote(id, ana, VoteChoice::Tie)?;
    let (s, e) = match criterion {
        Criterion::Value => (8, 3),
        Criterion::Complexity => (3, 8),
    };
    project.submit_magnitude(search, criterion, ana, s)?;
    project.submit_magnitude(export, criterion, ana, e)?;
}
let report = project.calculate()?;
assert_eq!(report.results[0].title, "Search");
# Ok::<(), PriorityError>(())
```

See the [manual] for the details of each stage and of the command line program.
*/

mod config;
mod consensus;
mod ledger;
mod matrix;
mod priority;
mod progress;
mod weights;

pub mod adapters;
pub mod builder;
pub mod events;
pub mod manual;
pub mod ports;
pub mod project;

pub use crate::config::*;
pub use crate::consensus::{Consensus, VoteTally};
pub use crate::ledger::{ComparisonRecord, MagnitudeRecord};
pub use crate::matrix::{pair_count, PairKey, PendingComparison};
pub use crate::progress::{CriterionProgress, PhaseProgress, Progress};
pub use crate::project::{ComparisonProvenance, Project};
