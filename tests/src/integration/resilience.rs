//! # Failure Handling
//!
//! What the client does when the device stops cooperating: stale values
//! survive timeouts, two clients coexist on one socket, and a method the
//! firmware never answers is retired from polling until asked back.
//!
//! Local ports 47371-47373.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::{sleep, timeout, Instant};

    use venuslink::{SupportState, TransportPool, VenusDevice, VenusError};
    use venuslink_wire::Method;

    use crate::support::{fast_client, MockVenus, Script};

    async fn wait_until(what: &str, limit: Duration, mut ready: impl FnMut() -> bool) {
        let deadline = Instant::now() + limit;
        while !ready() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            sleep(Duration::from_millis(50)).await;
        }
    }

    // =========================================================================
    // STALENESS
    // =========================================================================

    /// A timeout must not wipe the last good reading. The value and its
    /// timestamp stay put; only the valid flag drops.
    #[tokio::test]
    async fn test_timeout_keeps_last_value_but_marks_it_stale() {
        let mock = MockVenus::spawn(vec![(
            "Bat.GetStatus",
            Script::SilentAfter {
                answers: 1,
                result: json!({ "soc": 82 }),
            },
        )])
        .await;

        let pool = TransportPool::new();
        let device = VenusDevice::connect(&pool, fast_client(&mock, 47371))
            .await
            .unwrap();

        timeout(Duration::from_secs(5), device.query(Method::BatGetStatus))
            .await
            .expect("first query must be answered")
            .unwrap();
        let before = device.snapshot().await;
        let cached = before.get("battery.soc").unwrap();
        assert!(cached.valid);
        let first_seen_at = cached.updated_at;

        let err = timeout(Duration::from_secs(10), device.query(Method::BatGetStatus))
            .await
            .expect("second query must exhaust its attempts")
            .unwrap_err();
        assert!(
            matches!(err, VenusError::CommandTimeout { attempts: 3, .. }),
            "got: {err}"
        );

        let after = device.snapshot().await;
        let cached = after.get("battery.soc").unwrap();
        assert_eq!(cached.value, json!(82));
        assert!(!cached.valid);
        assert_eq!(cached.updated_at, first_seen_at);

        let stats = device.stats().get("Bat.GetStatus").unwrap();
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.timeouts, 3);
    }

    // =========================================================================
    // SHARED SOCKET
    // =========================================================================

    /// Two devices, one local port: replies are routed by correlation id,
    /// so concurrent queries never cross.
    #[tokio::test]
    async fn test_two_clients_share_one_socket() {
        let mock_a = MockVenus::spawn(vec![(
            "Bat.GetStatus",
            Script::Result(json!({ "soc": 11 })),
        )])
        .await;
        let mock_b = MockVenus::spawn(vec![(
            "Bat.GetStatus",
            Script::Result(json!({ "soc": 22 })),
        )])
        .await;

        let pool = TransportPool::new();
        let device_a = VenusDevice::connect(&pool, fast_client(&mock_a, 47372))
            .await
            .unwrap();
        let device_b = VenusDevice::connect(&pool, fast_client(&mock_b, 47372))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            device_a.query(Method::BatGetStatus),
            device_b.query(Method::BatGetStatus),
        );
        assert_eq!(a.unwrap()["soc"], 11);
        assert_eq!(b.unwrap()["soc"], 22);

        assert_eq!(pool.active_ports().await, vec![47372]);
    }

    // =========================================================================
    // UNSUPPORTED METHODS
    // =========================================================================

    /// A method that never answers gets probed `unsupported_after` times,
    /// then dropped from the schedule. A reset asks for it again.
    #[tokio::test]
    async fn test_silent_method_retired_then_reprobed_after_reset() {
        let mock = MockVenus::spawn(vec![
            ("Wifi.GetStatus", Script::Silent),
            ("Bat.GetStatus", Script::Result(json!({ "soc": 82 }))),
        ])
        .await;

        let mut config = fast_client(&mock, 47373);
        config.retry.query_attempts = 1;
        config.poll.unsupported_after = 2;

        let pool = TransportPool::new();
        let mut device = VenusDevice::connect(&pool, config).await.unwrap();
        device.start_polling();

        let stats = device.stats();
        wait_until("the silent method to be written off", Duration::from_secs(20), || {
            stats.support("Wifi.GetStatus") == SupportState::Unsupported
        })
        .await;

        // One attempt per probe cycle, two cycles, then nothing more.
        let probes_before_retirement = mock.seen("Wifi.GetStatus").len();
        assert_eq!(probes_before_retirement, 2);
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(mock.seen("Wifi.GetStatus").len(), probes_before_retirement);

        device.reset_method(Method::WifiGetStatus);
        wait_until("the reset to reach the scheduler", Duration::from_secs(5), || {
            stats.support("Wifi.GetStatus") != SupportState::Unsupported
        })
        .await;
        wait_until("a fresh probe after the reset", Duration::from_secs(15), || {
            mock.seen("Wifi.GetStatus").len() > probes_before_retirement
        })
        .await;

        device.stop_polling().await;
    }
}
