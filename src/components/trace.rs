//! Plugin logging each build stage.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use crate::module::{FactoryError, Parameters, Plugin, PluginFactory, StageEvent};
use crate::parser::ModuleNode;

/// Shared record of the lines written by trace plugins.
pub type Journal = Rc<RefCell<Vec<String>>>;

pub struct Trace {
    name: String,
    prefix: String,
    journal: Option<Journal>,
}

impl Plugin for Trace {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_stage(&mut self, event: &StageEvent<'_>) {
        let line = format!(
            "{}{} of `{}` ({} component(s))",
            self.prefix,
            event.stage,
            event.platform,
            event.components.len()
        );
        info!("{}", line);
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push(line);
        }
    }
}

#[derive(Default)]
pub struct TraceFactory {
    journal: Option<Journal>,
}

impl TraceFactory {
    /// A factory whose plugins also append their lines to `journal`.
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
        }
    }
}

impl PluginFactory for TraceFactory {
    fn type_name(&self) -> &str {
        "trace"
    }

    fn description(&self) -> &str {
        "Log the platform build stages"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().declare::<String>("prefix", "Text prepended to each line", String::new())
    }

    fn create(&self, node: &ModuleNode) -> Result<Box<dyn Plugin>, FactoryError> {
        Ok(Box::new(Trace {
            name: node.name().to_string(),
            prefix: node.params().get::<String>("prefix")?,
            journal: self.journal.clone(),
        }))
    }
}
