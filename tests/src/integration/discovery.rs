//! # Discovery Flows
//!
//! The broadcast probe end to end: find a device, then talk to it over
//! unicast, including running a query while a discovery window is open on
//! the same shared socket.
//!
//! Local ports 47381-47382.

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::{sleep, timeout};

    use venuslink::{discovery, DiscoveryConfig, TransportPool, VenusDevice};
    use venuslink_wire::Method;

    use crate::support::{fast_client, fast_client_at, MockVenus, Script};

    fn device_info(ble_mac: &str) -> serde_json::Value {
        json!({
            "device": "VenusE",
            "ver": 151,
            "ble_mac": ble_mac,
            "wifi_mac": "aa:bb:cc:dd:ee:ff",
            "ip": "127.0.0.1"
        })
    }

    fn window(target: &MockVenus, local_port: u16) -> DiscoveryConfig {
        DiscoveryConfig {
            broadcast_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: target.port(),
            local_port,
            window_secs: 1,
        }
    }

    /// Find a device by probe, then query it at the discovered address.
    #[tokio::test]
    async fn test_discover_then_query_found_device() {
        let mock = MockVenus::spawn(vec![
            ("Marstek.GetDevice", Script::Result(device_info("mac-int-a"))),
            ("Bat.GetStatus", Script::Result(json!({ "soc": 55 }))),
        ])
        .await;

        let pool = TransportPool::new();
        let found = timeout(
            Duration::from_secs(5),
            discovery::collect(&pool, &window(&mock, 47381)),
        )
        .await
        .expect("the window must close on its own")
        .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mac, "mac-int-a");
        assert_eq!(found[0].addr, mock.addr());
        assert_eq!(found[0].device.as_deref(), Some("VenusE"));

        // Talk to it where discovery said it lives.
        let config = fast_client_at(found[0].addr.ip().to_string(), found[0].addr.port(), 47381);
        let device = VenusDevice::connect(&pool, config).await.unwrap();
        let result = timeout(Duration::from_secs(5), device.query(Method::BatGetStatus))
            .await
            .expect("query must resolve")
            .unwrap();
        assert_eq!(result["soc"], 55);
    }

    /// An open discovery window must not swallow replies addressed to a
    /// pending command on the same socket, and vice versa.
    #[tokio::test]
    async fn test_query_during_open_discovery_window() {
        let responder = MockVenus::spawn(vec![(
            "Marstek.GetDevice",
            Script::Result(device_info("mac-int-b")),
        )])
        .await;
        let battery = MockVenus::spawn(vec![(
            "Bat.GetStatus",
            Script::Result(json!({ "soc": 41 })),
        )])
        .await;

        let pool = Arc::new(TransportPool::new());
        let config = window(&responder, 47382);
        let collector = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { discovery::collect(&pool, &config).await })
        };

        // Give the probe time to go out, then query mid-window.
        sleep(Duration::from_millis(150)).await;
        let device = VenusDevice::connect(&pool, fast_client(&battery, 47382))
            .await
            .unwrap();
        let result = timeout(Duration::from_secs(5), device.query(Method::BatGetStatus))
            .await
            .expect("query must resolve while the window is open")
            .unwrap();
        assert_eq!(result["soc"], 41);

        let found = timeout(Duration::from_secs(5), collector)
            .await
            .expect("the window must close on its own")
            .unwrap()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mac, "mac-int-b");
    }
}
