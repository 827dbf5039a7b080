pub mod explodes;
pub mod node_manip;
pub mod subparser;

pub use explodes::{explode, DecodeError};
pub use node_manip::{normalize_nodes, normalize_servername, NormalizeRejection};
pub use subparser::{parse_subscription, parse_subscription_body, ParseReport, ParsedSubscription};
