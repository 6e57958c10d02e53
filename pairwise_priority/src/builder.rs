pub use crate::config::*;

use std::sync::Arc;

use crate::ports::{Authorizer, EventSink};
use crate::project::Project;

/// A builder for setting up a project in one go.
///
/// The items and participants are registered in the order they were added, and the
/// comparison matrices of both criteria are generated in the default session.
///
/// ```
/// pub use pairwise_priority::builder::Builder;
/// pub use pairwise_priority::ScoringRules;
/// # use pairwise_priority::PriorityError;
///
/// let mut builder = Builder::new("roadmap", &ScoringRules::DEFAULT_RULES)?
///     .items(&["Search".to_string(), "Export".to_string()])?;
///
/// builder.add_participant("Ana", "product", true);
/// let project = builder.build()?;
/// assert_eq!(project.comparisons().len(), 2);
///
/// # Ok::<(), PriorityError>(())
/// ```
pub struct Builder {
    pub(crate) _id: ProjectId,
    pub(crate) _name: String,
    pub(crate) _rules: ScoringRules,
    pub(crate) _items: Vec<(String, String, String)>,
    pub(crate) _participants: Vec<(String, String, bool)>,
    pub(crate) _sink: Option<Arc<dyn EventSink>>,
    pub(crate) _authorizer: Option<Arc<dyn Authorizer>>,
}

impl Builder {
    pub fn new(id: &str, rules: &ScoringRules) -> Result<Builder, PriorityError> {
        Ok(Builder {
            _id: ProjectId(id.to_string()),
            _name: id.to_string(),
            _rules: rules.clone(),
            _items: Vec::new(),
            _participants: Vec::new(),
            _sink: None,
            _authorizer: None,
        })
    }

    pub fn name(self, name: &str) -> Builder {
        Builder {
            _name: name.to_string(),
            ..self
        }
    }

    /// Sets the items, by title only.
    pub fn items(self, titles: &[String]) -> Result<Builder, PriorityError> {
        let mut res = Builder {
            _items: Vec::new(),
            ..self
        };
        for t in titles.iter() {
            res.add_item(t, "", "")?;
        }
        Ok(res)
    }

    /// Adds an item. Titles must be unique, ignoring case and surrounding spaces.
    pub fn add_item(
        &mut self,
        title: &str,
        description: &str,
        acceptance_notes: &str,
    ) -> Result<(), PriorityError> {
        let norm = title.trim().to_lowercase();
        if self
            ._items
            .iter()
            .any(|(t, _, _)| t.trim().to_lowercase() == norm)
        {
            return DuplicateTitleSnafu { title }.fail();
        }
        self._items.push((
            title.to_string(),
            description.to_string(),
            acceptance_notes.to_string(),
        ));
        Ok(())
    }

    pub fn add_participant(&mut self, name: &str, role: &str, is_facilitator: bool) {
        self._participants
            .push((name.to_string(), role.to_string(), is_facilitator));
    }

    pub fn sink(self, sink: Arc<dyn EventSink>) -> Builder {
        Builder {
            _sink: Some(sink),
            ..self
        }
    }

    pub fn authorizer(self, authorizer: Arc<dyn Authorizer>) -> Builder {
        Builder {
            _authorizer: Some(authorizer),
            ..self
        }
    }

    pub fn build(self) -> Result<Project, PriorityError> {
        let mut project = Project::new(self._id, &self._name).with_rules(&self._rules);
        if let Some(sink) = self._sink {
            project = project.with_sink(sink);
        }
        if let Some(authorizer) = self._authorizer {
            project = project.with_authorizer(authorizer);
        }
        for (title, description, notes) in self._items.iter() {
            project.add_item(title, description, notes)?;
        }
        for (name, role, is_facilitator) in self._participants.iter() {
            project.add_participant(name, role, *is_facilitator);
        }
        for criterion in Criterion::ALL {
            project.generate_matrix(criterion, SessionId::DEFAULT)?;
        }
        Ok(project)
    }
}
