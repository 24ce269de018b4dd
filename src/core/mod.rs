//! Engine core: configuration and the [`Mediation`] container.
//!
//! - [`config`]: timeouts and switches, passed once at construction;
//! - [`builder`]: wires dispatcher, bus, subscribers, partners and loader;
//! - [`mediation`]: the container handing out slot controllers.

mod builder;
mod config;
mod mediation;

pub use builder::MediationBuilder;
pub use config::MediationConfig;
pub use mediation::Mediation;
