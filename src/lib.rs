//! Fill third-party web forms from a batch of records.
//!
//! For each record the page markup and the record's fields go to a
//! language model, which answers with a plan of fill/click actions. The
//! plan is validated and then applied to a live Chrome tab, one action at
//! a time, with every action's failure isolated from the rest.

pub mod brain;
pub mod config;
pub mod dom;
pub mod errors;
pub mod executor;
pub mod face;
pub mod hands;
pub mod orchestrator;
pub mod page;
pub mod records;
pub mod schema;
pub mod types;

pub use brain::{ModelClient, ModelRequest, OpenRouterClient, PlanGenerator};
pub use config::Settings;
pub use executor::{ActionExecutor, Applied, PlanRunner};
pub use orchestrator::{BatchReport, Orchestrator, RecordReport, RunEvent};
pub use page::Page;
pub use records::{Record, load_records};
pub use types::{Action, ActionPlan, Timings};
