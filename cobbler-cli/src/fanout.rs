//! Fan-Out Executor
//!
//! One request per target, all in flight at once, each under its own
//! deadline. Outcomes come back in target order and there is always exactly
//! one per target.

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::client::OperationError;
use crate::resolver::Target;

#[derive(Debug)]
pub struct OperationOutcome<T> {
    pub target: Target,
    pub result: Result<T, OperationError>,
}

#[derive(Debug)]
pub struct FanOutReport<T> {
    pub outcomes: Vec<OperationOutcome<T>>,
}

impl<T> FanOutReport<T> {
    pub fn had_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.result.is_err())
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    deadline: Duration,
}

impl FanOut {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Run `operation` against every target concurrently.
    pub async fn run<T, F, Fut>(&self, targets: Vec<Target>, operation: F) -> FanOutReport<T>
    where
        F: Fn(Target) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let deadline = self.deadline;
        let requests = targets.into_iter().map(|target| {
            let request = operation(target.clone());
            async move {
                let result = match tokio::time::timeout(deadline, request).await {
                    Ok(result) => result,
                    Err(_) => Err(OperationError::Timeout(deadline)),
                };
                if let Err(e) = &result {
                    debug!("{} failed: {}", target.address, e);
                }
                OperationOutcome { target, result }
            }
        });

        FanOutReport {
            outcomes: join_all(requests).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TargetOrigin;

    fn target(address: &str) -> Target {
        Target {
            address: address.to_string(),
            display_name: None,
            api_key: None,
            origin: TargetOrigin::Explicit,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_follows_targets_not_completion() {
        let targets = vec![target("slow:1"), target("fast:2"), target("mid:3")];
        let report = FanOut::new(Duration::from_secs(10))
            .run(targets, |t| async move {
                let delay = match t.address.as_str() {
                    "slow:1" => 3,
                    "fast:2" => 1,
                    _ => 2,
                };
                tokio::time::sleep(Duration::from_secs(delay)).await;
                Ok::<_, OperationError>(t.address)
            })
            .await;

        let order: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| o.result.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["slow:1", "fast:2", "mid:3"]);
        assert!(!report.had_failures());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_hung_target_times_out_alone() {
        let targets = vec![target("a:1"), target("hung:2"), target("c:3")];
        let started = tokio::time::Instant::now();
        let report = FanOut::new(Duration::from_secs(5))
            .run(targets, |t| async move {
                if t.address.starts_with("hung") {
                    futures::future::pending::<()>().await;
                }
                Ok::<_, OperationError>(())
            })
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.failures(), 1);
        assert!(matches!(
            report.outcomes[1].result,
            Err(OperationError::Timeout(_))
        ));
        assert!(report.had_failures());
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_empty_target_list() {
        let report = FanOut::new(Duration::from_secs(1))
            .run(Vec::new(), |_| async { Ok::<_, OperationError>(()) })
            .await;
        assert!(report.is_empty());
        assert!(!report.had_failures());
    }
}
