pub mod api;
pub mod approvals;
pub mod bootstrap;
pub mod collaborators;
pub mod health;
pub mod sweep;

pub use approvals::{DecisionError, DecisionOutcome, DecisionService, ResolverIdentity};
pub use bootstrap::{bootstrap, Application, BootstrapError};
pub use collaborators::{
    ActionEvent, Broadcaster, BroadcastHub, BookingWriter, CollaboratorError, Notification,
    Notifier, RepositoryBookingWriter, TracingNotifier,
};
pub use sweep::{SweepReport, SweepService};
