//! Basic circuit breaker usage example

use breakerbox::{CircuitBreaker, CircuitRegistry, StrategyKind, Trip, circuit};
use std::io;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    println!("=== Circuit Breaker Basic Example ===\n");

    let registry = CircuitRegistry::new();

    // Create a circuit with builder API
    let payments = Arc::new(
        CircuitBreaker::<String, io::Error>::builder("payment_api")
            .error_threshold(3)
            .recovery_timeout(Duration::from_millis(500))
            .recovery_threshold(2)
            .allow("io.invalid_input")
            .on_open(|circuit, trip| {
                let cause = match trip {
                    Trip::Fault(e) => e.to_string(),
                    Trip::Detected(value) => format!("bad value {value}"),
                };
                println!("🔴 Circuit '{}' opened! ({})", circuit.id(), cause);
            })
            .on_close(|circuit| println!("🟢 Circuit '{}' closed!", circuit.id()))
            .build()
            .expect("valid config"),
    );
    registry
        .register(payments.clone())
        .expect("unique circuit id");

    println!("Initial state: {}\n", payments.state());

    // Simulate successful calls
    println!("--- Successful calls ---");
    for i in 1..=2 {
        match payments.call(|| Ok(format!("Payment {}", i))) {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", payments.state());

    // Tolerated faults propagate but are not counted
    println!("--- Allow-listed fault ---");
    if let Err(e) = payments.call(|| Err(io::Error::new(io::ErrorKind::InvalidInput, "bad card"))) {
        println!("✗ {} (errors counted: {})", e, payments.error_count());
    }
    println!();

    // Simulate failures
    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match payments.call(|| Err(io::Error::other(format!("Payment failed {}", i)))) {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", payments.state());

    // Try calling while open
    println!("--- Attempting call while open ---");
    match payments.call(|| Ok("Should be rejected".to_string())) {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {}", e),
    }
    println!("Open circuits: {:?}\n", ids(&registry));

    // Wait out the recovery window
    println!("--- Recovering ---");
    std::thread::sleep(Duration::from_millis(550));
    println!("🟡 State after cooldown: {}", payments.state());
    for i in 1..=2 {
        let _ = payments.call(|| Ok(format!("Trial payment {}", i)));
        println!("State after trial {}: {}", i, payments.state());
    }
    println!();

    // Net-error strategy with a wrapped function
    println!("--- Net-error strategy ---");
    let flaky = circuit(
        |attempt: u32| {
            if attempt % 2 == 0 {
                Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"))
            } else {
                Ok(attempt)
            }
        },
        CircuitBreaker::builder("flaky_dependency")
            .strategy(StrategyKind::NetError)
            .error_threshold(2),
    )
    .expect("valid config");
    for attempt in 1..=6 {
        let outcome = flaky.call(attempt);
        println!(
            "attempt {} -> {:?}, state {}",
            attempt,
            outcome.map_err(|e| e.to_string()),
            flaky.breaker().state()
        );
    }
}

fn ids(registry: &CircuitRegistry) -> Vec<String> {
    registry
        .get_open_circuits()
        .iter()
        .map(|c| c.id().to_string())
        .collect()
}
