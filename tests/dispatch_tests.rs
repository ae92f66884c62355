use std::thread;
use std::time::Duration;

use inpaintd::dispatch::Dispatcher;
use inpaintd::InpaintError;

#[tokio::test]
async fn submit_returns_the_task_result() {
    let dispatcher = Dispatcher::new(2, 2);
    let value = dispatcher.submit(|| Ok(41 + 1)).await.expect("submit");
    assert_eq!(value, 42);
}

#[tokio::test]
async fn submit_propagates_task_errors() {
    let dispatcher = Dispatcher::new(2, 2);
    let err = dispatcher
        .submit::<u32, _>(|| Err(InpaintError::EmptyMask))
        .await
        .expect_err("task error");
    assert_eq!(err, InpaintError::EmptyMask);
}

#[tokio::test]
async fn overload_boundary_rejects_excess_submissions() {
    // One slot plus one queue place: pool + queue + 1 concurrent
    // submissions must produce at least one rejection.
    let dispatcher = Dispatcher::new(1, 1);
    let slow = || {
        thread::sleep(Duration::from_millis(150));
        Ok(0u32)
    };

    let (first, second, third) = tokio::join!(
        dispatcher.submit(slow),
        dispatcher.submit(slow),
        dispatcher.submit(slow),
    );

    let results = [first, second, third];
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Err(InpaintError::Overloaded)))
        .count();
    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    assert!(rejected >= 1, "expected at least one Overloaded rejection");
    assert_eq!(succeeded + rejected, 3);
}

#[tokio::test]
async fn slots_are_released_after_completion() {
    let dispatcher = Dispatcher::new(2, 2);
    assert_eq!(dispatcher.available_slots(), 2);

    let (first, second) = tokio::join!(
        dispatcher.submit(|| {
            thread::sleep(Duration::from_millis(20));
            Ok(1u32)
        }),
        dispatcher.submit(|| {
            thread::sleep(Duration::from_millis(20));
            Ok(2u32)
        }),
    );
    first.expect("first");
    second.expect("second");

    assert_eq!(dispatcher.available_slots(), 2);
}
