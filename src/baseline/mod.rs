mod applied;
mod store;

pub use applied::needs_apply;
pub use applied::AppliedConfig;
pub use applied::ReconciliationState;
pub use store::BaselineStore;
pub use store::InMemoryBaselineStore;
pub use store::JsonFileBaselineStore;
pub use store::StoreError;
