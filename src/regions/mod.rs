mod store;

pub use store::{
    ActivationChange, Region, RegionChange, RegionError, RegionId, RegionStore, RegionUpdate,
    DEFAULT_REGION_LABEL,
};
