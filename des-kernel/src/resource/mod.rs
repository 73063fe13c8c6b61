pub mod manager;
pub mod multi;
pub mod request;
pub mod resource;

pub use manager::{AccessRegulator, AllowAll, MostAvailable, ResourceManager, ScoringStrategy, MAX_VALUE, MIN_VALUE};
pub use multi::{RotatingMultiRequest, RotationOutcome};
pub use request::{RequestStatus, ResourceRequest};
pub use resource::{Resource, ResourceHandle};
