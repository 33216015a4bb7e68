//! # Primary Client Flows
//!
//! Full round trips through [`venuslink::VenusDevice`]: a status query that
//! survives dropped datagrams, a mode change with the exact wire envelope
//! checked on the device side, and a polling session feeding the cache.
//!
//! Local ports 47361-47364.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::{sleep, timeout, Instant};

    use venuslink::{SupportState, TransportPool, VenusDevice};
    use venuslink_wire::{Method, ModeConfig, OperatingMode};

    use crate::support::{fast_client, MockVenus, Script};

    // =========================================================================
    // QUERY AND RETRY
    // =========================================================================

    /// Two dropped attempts, then an answer: the caller sees one success,
    /// the cache fills, and the counters show the whole story.
    #[tokio::test]
    async fn test_retry_then_success_updates_cache_and_stats() {
        let mock = MockVenus::spawn(vec![(
            "Bat.GetStatus",
            Script::AnswerAfter {
                drop: 2,
                result: json!({ "soc": 82, "bat_temp": 290 }),
            },
        )])
        .await;

        let pool = TransportPool::new();
        let device = VenusDevice::connect(&pool, fast_client(&mock, 47361))
            .await
            .unwrap();

        let result = timeout(Duration::from_secs(10), device.query(Method::BatGetStatus))
            .await
            .expect("query must finish within its retry budget")
            .unwrap();
        assert_eq!(result["soc"], 82);

        let snapshot = device.snapshot().await;
        assert_eq!(snapshot.battery_soc(), Some(82.0));
        assert_eq!(snapshot.battery_temperature(), Some(29.0));
        assert!(snapshot.get("battery.soc").unwrap().valid);

        let stats = device.stats().get("Bat.GetStatus").unwrap();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.timeouts, 2);
        assert_eq!(stats.support, SupportState::Supported);

        // Every attempt went out under its own correlation id, with the
        // standard instance filter.
        let seen = mock.seen("Bat.GetStatus");
        assert_eq!(seen.len(), 3);
        let ids: HashSet<u64> = seen.iter().map(|request| request.id).collect();
        assert_eq!(ids.len(), 3);
        for request in &seen {
            assert_eq!(request.params, Some(json!({ "id": 0 })));
        }
    }

    /// An error object is a firm answer. The client must surface it
    /// immediately instead of burning the remaining attempts.
    #[tokio::test]
    async fn test_device_error_answers_are_not_retried() {
        let mock = MockVenus::spawn(vec![(
            "ES.SetMode",
            Script::Error {
                code: -32000,
                message: "set failed".to_string(),
            },
        )])
        .await;

        let pool = TransportPool::new();
        let device = VenusDevice::connect(&pool, fast_client(&mock, 47362))
            .await
            .unwrap();

        let err = timeout(Duration::from_secs(5), device.set_mode(ModeConfig::auto()))
            .await
            .expect("an answered error must resolve without retries")
            .unwrap_err();
        assert!(err.to_string().contains("set failed"), "got: {err}");

        assert_eq!(mock.seen("ES.SetMode").len(), 1);
        let stats = device.stats().get("ES.SetMode").unwrap();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.successes, 0);
    }

    // =========================================================================
    // MODE CHANGES
    // =========================================================================

    /// The passive-mode envelope carries the full nested config, and a
    /// follow-up mode read parses back to the catalog type.
    #[tokio::test]
    async fn test_set_mode_envelope_and_readback() {
        let mock = MockVenus::spawn(vec![
            ("ES.SetMode", Script::Result(json!({ "set_result": true }))),
            ("ES.GetMode", Script::Result(json!({ "mode": "Passive" }))),
        ])
        .await;

        let pool = TransportPool::new();
        let device = VenusDevice::connect(&pool, fast_client(&mock, 47363))
            .await
            .unwrap();

        let result = timeout(
            Duration::from_secs(5),
            device.set_mode(ModeConfig::passive(-200, 600)),
        )
        .await
        .expect("mode change must resolve")
        .unwrap();
        assert_eq!(result["set_result"], true);

        let seen = mock.seen("ES.SetMode");
        let params = seen[0].params.as_ref().unwrap();
        assert_eq!(params["id"], 0);
        assert_eq!(params["config"]["mode"], "Passive");
        assert_eq!(params["config"]["passive_cfg"]["power"], -200);
        assert_eq!(params["config"]["passive_cfg"]["cd_time"], 600);

        let mode = device.es_mode().await.unwrap();
        assert_eq!(mode.operating_mode(), Some(OperatingMode::Passive));
    }

    // =========================================================================
    // POLLING
    // =========================================================================

    /// Start polling, let the first cycles run, and read the merged snapshot.
    #[tokio::test]
    async fn test_polling_fills_snapshot_across_tiers() {
        let mock = MockVenus::spawn(vec![
            (
                "Bat.GetStatus",
                Script::Result(json!({ "soc": 82, "bat_temp": 290 })),
            ),
            (
                "ES.GetStatus",
                Script::Result(json!({ "bat_soc": 82, "bat_power": -150 })),
            ),
            ("ES.GetMode", Script::Result(json!({ "mode": "Auto" }))),
        ])
        .await;

        let pool = TransportPool::new();
        let mut device = VenusDevice::connect(&pool, fast_client(&mock, 47364))
            .await
            .unwrap();

        device.start_polling();
        assert!(device.is_polling());

        // The high tier lands on the first tick, the mode read on the second.
        let deadline = Instant::now() + Duration::from_secs(10);
        let snapshot = loop {
            let snapshot = device.snapshot().await;
            if snapshot.battery_soc().is_some()
                && snapshot.operating_mode().is_some()
                && snapshot.number("es.bat_power").is_some()
            {
                break snapshot;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for polled state, have: {:?}",
                snapshot.keys().collect::<Vec<_>>()
            );
            sleep(Duration::from_millis(50)).await;
        };

        assert_eq!(snapshot.battery_soc(), Some(82.0));
        assert_eq!(snapshot.battery_temperature(), Some(29.0));
        assert_eq!(snapshot.number("es.bat_power"), Some(-150.0));
        assert_eq!(snapshot.operating_mode(), Some(OperatingMode::Auto));

        device.stop_polling().await;
        assert!(!device.is_polling());
    }
}
