//! Service Module
//!
//! The data-access façade, its live subscriptions, field validation and the
//! current project/requirement selection.

pub mod facade;
pub mod selection;
pub mod subscription;
pub mod validation;

pub use facade::{CachedValue, DataService, ANONYMOUS_USER};
pub use selection::SelectionState;
pub use subscription::{
    ChangeCallback, ErrorCallback, Subscription, SubscriptionConfig, SubscriptionData,
};
pub use validation::{FieldRule, Rule, ValidationSchema};
