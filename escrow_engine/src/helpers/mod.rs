//! Pure building blocks of the settlement core. Nothing in here touches storage.
pub mod clock;
pub mod fees;
pub mod proximity;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fees::{FeeError, FeeSchedule};
pub use proximity::{check_proximity, haversine_distance, GeoError, GeoPoint, LocationSample, ProximityResult};
