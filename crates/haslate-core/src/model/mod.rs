mod entity_id;
mod state;

pub use entity_id::{EntityId, LOCAL_DOMAIN};
pub use state::{EntityEntry, EntityState, Origin, Scalar};
