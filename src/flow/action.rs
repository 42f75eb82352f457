//! Action - the unit of work executed at each DAG node
//!
//! Actions are pure computation: they receive the ordered results of their
//! predecessors and return a single value. An action may expose a
//! compensating action of the same shape, invoked during rollback.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A node capability in a workflow DAG.
///
/// `execute` receives the results of the node's predecessors, in the order
/// the DAG edges resolve to, and produces this node's result. For the
/// synthetic root the list holds the caller's seed input. Slots belonging
/// to predecessors that never produced a result arrive as `Value::Null`;
/// compensating actions in particular must tolerate such holes.
#[async_trait]
pub trait Action: Send + Sync {
    /// Stable identity of this action within one registration domain
    fn name(&self) -> &str;

    /// Run the action against its predecessors' results
    async fn execute(&self, predecessor_results: Vec<Value>) -> anyhow::Result<Value>;

    /// The compensating action invoked during rollback, if any
    fn compensation(&self) -> Option<Arc<dyn Action>> {
        None
    }
}

/// Identity action returning its single predecessor result unchanged.
///
/// Used as the synthetic root that feeds every originally-rootless node.
pub struct NoopAction;

#[async_trait]
impl Action for NoopAction {
    fn name(&self) -> &str {
        "noop"
    }

    async fn execute(&self, mut predecessor_results: Vec<Value>) -> anyhow::Result<Value> {
        Ok(predecessor_results.pop().unwrap_or(Value::Null))
    }
}

type ActionFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap a plain async closure as an [`Action`].
///
/// Builder counterpart of implementing the trait by hand; carries no runtime
/// behavior of its own. A rollback closure can be attached with
/// [`with_compensation`](FnAction::with_compensation):
///
/// ```ignore
/// let reserve = FnAction::new("reserve", |prev| async move { Ok(json!("held")) })
///     .with_compensation(|prev| async move { Ok(json!("released")) });
/// ```
pub struct FnAction {
    name: String,
    func: ActionFn,
    compensation: Option<Arc<dyn Action>>,
}

impl FnAction {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |results| Box::pin(func(results))),
            compensation: None,
        }
    }

    /// Register a closure as this action's compensating action.
    ///
    /// The rollback action is named `<name>.rollback`.
    pub fn with_compensation<F, Fut>(self, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let rollback = FnAction::new(format!("{}.rollback", self.name), func);
        self.with_compensation_action(Arc::new(rollback))
    }

    /// Register a full [`Action`] as this action's compensating action
    pub fn with_compensation_action(mut self, action: Arc<dyn Action>) -> Self {
        self.compensation = Some(action);
        self
    }
}

#[async_trait]
impl Action for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, predecessor_results: Vec<Value>) -> anyhow::Result<Value> {
        (self.func)(predecessor_results).await
    }

    fn compensation(&self) -> Option<Arc<dyn Action>> {
        self.compensation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_returns_input_unchanged() {
        let result = NoopAction.execute(vec![json!(42)]).await.unwrap();
        assert_eq!(result, json!(42));

        let result = NoopAction.execute(vec![]).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_fn_action_executes_closure() {
        let double = FnAction::new("double", |prev: Vec<Value>| async move {
            let n = prev[0].as_i64().unwrap_or(0);
            Ok(json!(n * 2))
        });
        assert_eq!(double.name(), "double");
        assert!(double.compensation().is_none());
        assert_eq!(double.execute(vec![json!(21)]).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_fn_action_compensation_naming() {
        let act = FnAction::new("reserve", |_| async move { Ok(json!("held")) })
            .with_compensation(|_| async move { Ok(json!("released")) });
        let comp = act.compensation().unwrap();
        assert_eq!(comp.name(), "reserve.rollback");
        assert_eq!(comp.execute(vec![]).await.unwrap(), json!("released"));
    }
}
