use failsafe::futures::CircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error, StateMachine};
use std::time::Duration;

use crate::core::errors::AppError;

/// Circuit breaker guarding calls to an external service
///
/// Policy:
/// - 5 consecutive failures triggers OPEN state
/// - 5 seconds cool-down period before HALF-OPEN (retry)
pub type ServiceCircuitBreaker = StateMachine<
    failure_policy::ConsecutiveFailures<backoff::Constant>,
    ()
>;

pub fn create_circuit_breaker() -> ServiceCircuitBreaker {
    Config::new()
        .failure_policy(failure_policy::consecutive_failures(
            5,
            backoff::constant(Duration::from_secs(5)),
        ))
        .build()
}

/// Run `operation` under the breaker.
///
/// Only errors for which `is_failure` returns true count towards opening the
/// circuit; a declined card is the customer's problem, not the provider's.
/// A rejected call (open circuit) becomes `AppError::TransientError`.
pub async fn execute_with_cb<F, Fut, T>(
    cb: &ServiceCircuitBreaker,
    service: &str,
    operation: F,
) -> Result<T, AppError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    match cb.call_with(is_provider_failure, operation()).await {
        Ok(val) => Ok(val),
        Err(Error::Inner(e)) => Err(e),
        Err(Error::Rejected) => Err(AppError::TransientError(format!(
            "Circuit breaker open for {}",
            service
        ))),
    }
}

fn is_provider_failure(err: &AppError) -> bool {
    matches!(
        err,
        AppError::DependencyFailure { .. } | AppError::TransientError(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream_error() -> AppError {
        AppError::DependencyFailure {
            service: "stripe".to_string(),
            error: "502 Bad Gateway".to_string(),
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = create_circuit_breaker();

        for _ in 0..5 {
            let result = execute_with_cb(&cb, "stripe", || async { Err::<(), _>(upstream_error()) }).await;
            match result {
                Err(AppError::DependencyFailure { .. }) => {}
                _ => panic!("Expected DependencyFailure, got {:?}", result),
            }
        }

        // Circuit is open: even a succeeding operation is rejected
        let result = execute_with_cb(&cb, "stripe", || async { Ok::<(), AppError>(()) }).await;

        match result {
            Err(AppError::TransientError(msg)) => assert!(msg.contains("stripe")),
            _ => panic!("Expected open circuit, got {:?}", result),
        }
    }

    #[tokio::test]
    async fn test_declines_do_not_open_circuit() {
        let cb = create_circuit_breaker();

        for _ in 0..10 {
            let result = execute_with_cb(&cb, "stripe", || async {
                Err::<(), _>(AppError::PaymentDeclined("Your card was declined.".to_string()))
            })
            .await;
            assert!(matches!(result, Err(AppError::PaymentDeclined(_))));
        }

        let result = execute_with_cb(&cb, "stripe", || async { Ok::<u8, AppError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
