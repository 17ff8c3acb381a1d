//! Utility functions.

use tracing::info;

/// Wait for Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Relative difference between two values, in percent of `base`.
///
/// Returns 0 when `base` is zero or either input is not finite.
pub fn pct_change(base: f64, value: f64) -> f64 {
    if base == 0.0 || !base.is_finite() || !value.is_finite() {
        return 0.0;
    }
    (value - base) / base * 100.0
}

/// Whether two floats agree within a relative tolerance.
pub fn approx_eq(a: f64, b: f64, rel_tol: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= rel_tol * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pct_change_handles_degenerate_inputs() {
        assert!((pct_change(100.0, 105.0) - 5.0).abs() < 1e-12);
        assert_eq!(pct_change(0.0, 5.0), 0.0);
        assert_eq!(pct_change(1.0, f64::NAN), 0.0);
    }

    #[test]
    fn approx_eq_is_relative() {
        assert!(approx_eq(1.0 / 0.00026, 3846.153846153846, 1e-12));
        assert!(!approx_eq(1.0, 1.001, 1e-6));
    }
}
