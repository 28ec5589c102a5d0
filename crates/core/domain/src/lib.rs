pub mod data;

pub use data::{
    DataPoint, NewRequirement, Requirement, RequirementFilter, RequirementPage, WillingToPay,
};
