use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource name must not be empty")]
    EmptyName,

    #[error("resource \"{0}\" is defined more than once")]
    DuplicateName(String),

    #[error("resource \"{0}\" has a fixed capacity of zero")]
    ZeroCapacity(String),

    #[error("resource \"{0}\" combines an availability schedule with failures")]
    ScheduleWithFailures(String),

    #[error("resource \"{0}\" uses a distance-based failure trigger")]
    DistanceTrigger(String),

    #[error("schedule of resource \"{0}\" has no slots or a zero slot length")]
    EmptySchedule(String),

    #[error("unknown resource \"{0}\"")]
    UnknownResource(String),

    #[error("resource \"{name}\" cannot supply {needed} units (at most {available})")]
    DemandExceedsCapacity { name: String, needed: u32, available: u32 },

    #[error("the resource demand is empty")]
    EmptyDemand,
}

pub type ResourceResult<T> = Result<T, ResourceError>;
