// tests/integration_test.rs

//! Integration tests for the connection core.
//!
//! These tests drive a real connection manager against a scripted CitrineDB
//! server, verifying request echo, heartbeat liveness, reconnect replay,
//! and client-death cleanup end-to-end.

mod integration {
    pub mod connection_test;
    pub mod heartbeat_test;
    pub mod reconnect_test;
    pub mod subscription_test;
    pub mod test_helpers;
}
