pub use super::execution_results::Entity as ExecutionResults;
pub use super::orders::Entity as Orders;
