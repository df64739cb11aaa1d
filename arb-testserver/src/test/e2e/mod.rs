mod client;
mod runtime;


use rama::telemetry::tracing;

#[tokio::test]
#[tracing_test::traced_test]
async fn test_runtime_spawn() {
    // simple test to ensure that spawning a server works,
    // outside out of any other things that might otherwise go wrong

    let runtime = self::runtime::spawn_with_args(&[]).await;
    assert_ne!(0, runtime.metrics_socket_addr().port);
}
