//! Cross-thread tests for the dispatcher: ordering, wakeup and quit
//! guarantees under true parallelism.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use switchyard_core::{Dispatcher, Message, MessageFilter, Received, WindowHandle, codes};

/// Spawn a thread that creates a window on itself, hands the handle back,
/// and then drains its mailbox with `consume` until `consume` returns false.
fn spawn_owner<F>(
    dispatcher: Arc<Dispatcher>,
    consume: F,
) -> (WindowHandle, thread::JoinHandle<()>)
where
    F: FnMut(&Dispatcher, Message) -> bool + Send + 'static,
{
    let (handle_tx, handle_rx) = crossbeam_channel::bounded(1);
    let mut consume = consume;

    let worker = thread::spawn(move || {
        let window = dispatcher.create_window(|_, _, _, _| 0, 0);
        handle_tx.send(window).unwrap();

        loop {
            match dispatcher.get_message(&MessageFilter::any()) {
                Received::Message(msg) => {
                    if !consume(&dispatcher, msg) {
                        break;
                    }
                }
                Received::Quit { .. } => break,
            }
        }
    });

    let window = handle_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("owner thread should create its window");
    (window, worker)
}

#[test]
fn test_fifo_per_producer_across_threads() {
    const PRODUCERS: usize = 3;
    const PER_PRODUCER: usize = 100;

    let dispatcher = Arc::new(Dispatcher::new().unwrap());
    let received = Arc::new(Mutex::new(Vec::new()));

    let received_log = received.clone();
    let mut seen = 0usize;
    let (window, consumer) = spawn_owner(dispatcher.clone(), move |_, msg| {
        received_log.lock().push((msg.code, msg.param1));
        seen += 1;
        seen < PRODUCERS * PER_PRODUCER
    });

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    assert!(dispatcher.post_message(
                        window,
                        0x0400 + producer as u32,
                        seq as isize,
                        0
                    ));
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    consumer.join().unwrap();

    // Interleaving across producers is free; each producer's own messages
    // must arrive in ascending sequence order.
    let log = received.lock();
    assert_eq!(log.len(), PRODUCERS * PER_PRODUCER);
    for producer in 0..PRODUCERS {
        let code = 0x0400 + producer as u32;
        let sequence: Vec<isize> = log
            .iter()
            .filter(|(c, _)| *c == code)
            .map(|(_, seq)| *seq)
            .collect();
        let expected: Vec<isize> = (0..PER_PRODUCER as isize).collect();
        assert_eq!(sequence, expected, "producer {producer} was reordered");
    }
}

#[test]
fn test_blocked_consumer_wakes_on_post() {
    let dispatcher = Arc::new(Dispatcher::new().unwrap());
    let (id_tx, id_rx) = crossbeam_channel::bounded(1);
    let (msg_tx, msg_rx) = crossbeam_channel::bounded(1);

    let consumer_dispatcher = dispatcher.clone();
    let consumer = thread::spawn(move || {
        id_tx.send(thread::current().id()).unwrap();
        // Block before any message exists.
        let received = consumer_dispatcher.get_message(&MessageFilter::any());
        msg_tx.send(received).unwrap();
    });

    let consumer_thread = id_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Give the consumer time to actually block.
    thread::sleep(Duration::from_millis(50));
    let posted_at = Instant::now();
    assert!(dispatcher.post_thread_message(consumer_thread, 0x0777, 123, 0));

    let received = msg_rx
        .recv_timeout(Duration::from_millis(200))
        .expect("consumer should unblock promptly");
    assert!(posted_at.elapsed() < Duration::from_millis(200));

    match received {
        Received::Message(msg) => {
            assert_eq!(msg.code, 0x0777);
            assert_eq!(msg.param1, 123);
        }
        Received::Quit { .. } => panic!("unexpected quit"),
    }

    consumer.join().unwrap();
}

#[test]
fn test_send_observed_before_queued_dispatches() {
    let dispatcher = Arc::new(Dispatcher::new().unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));
    let (window_tx, window_rx) = crossbeam_channel::bounded(1);
    let (start_tx, start_rx) = crossbeam_channel::bounded::<()>(1);

    // The owner creates a window whose proc records every invocation, then
    // waits for the go signal before draining its queue.
    let owner_dispatcher = dispatcher.clone();
    let owner_order = order.clone();
    let owner = thread::spawn(move || {
        let proc_order = owner_order.clone();
        let window = owner_dispatcher.create_window(
            move |_, _, param1, _| {
                proc_order.lock().push(param1);
                0
            },
            0,
        );
        window_tx.send(window).unwrap();
        start_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for _ in 0..5 {
            let msg = owner_dispatcher
                .get_message(&MessageFilter::any())
                .into_message()
                .expect("posted message");
            owner_dispatcher.dispatch_message(&msg);
        }
    });

    let window = window_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Queue five messages, then send synchronously. The send happens-before
    // the owner's first get_message, so its callback must be observed first.
    for seq in 1..=5 {
        assert!(dispatcher.post_message(window, 0x0400, seq, 0));
    }
    assert_eq!(dispatcher.send_message(window, 0x0401, -1, 0), 0);
    start_tx.send(()).unwrap();

    owner.join().unwrap();

    let log = order.lock();
    assert_eq!(log.len(), 6);
    assert_eq!(log[0], -1, "send callback must run before queued dispatches");
    assert_eq!(&log[1..], &[1, 2, 3, 4, 5]);
}

#[test]
fn test_quit_only_affects_posting_thread() {
    let dispatcher = Arc::new(Dispatcher::new().unwrap());
    let (id_tx, id_rx) = crossbeam_channel::bounded(1);
    let (exit_tx, exit_rx) = crossbeam_channel::bounded(1);

    // Thread A quits itself and reports the exit code it observed.
    let a_dispatcher = dispatcher.clone();
    let thread_a = thread::spawn(move || {
        id_tx.send(thread::current().id()).unwrap();
        a_dispatcher.post_quit_message(42);
        match a_dispatcher.get_message(&MessageFilter::any()) {
            Received::Quit { exit_code } => exit_tx.send(exit_code).unwrap(),
            Received::Message(msg) => panic!("expected quit, got code {}", msg.code),
        }
    });

    let a_id = id_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let exit_code = exit_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(exit_code, 42);
    thread_a.join().unwrap();

    // This thread's mailbox is untouched by A's quit.
    assert!(dispatcher.peek_message(&MessageFilter::any(), false).is_none());

    // A's mailbox drained its own quit; nothing leaked back into it either.
    assert!(dispatcher.post_thread_message(a_id, 1, 0, 0));
}

#[test]
fn test_concurrent_window_churn_is_safe() {
    let dispatcher = Arc::new(Dispatcher::new().unwrap());
    let delivered = Arc::new(AtomicUsize::new(0));

    // One thread creates and destroys windows while others post into the
    // churn; every post must either deliver or fail cleanly.
    let churn_dispatcher = dispatcher.clone();
    let churn = thread::spawn(move || {
        for _ in 0..50 {
            let window = churn_dispatcher.create_window(|_, _, _, _| 0, 0);
            thread::yield_now();
            assert!(churn_dispatcher.destroy_window(window));
        }
    });

    let posters: Vec<_> = (0..2)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let delivered = delivered.clone();
            thread::spawn(move || {
                let window = dispatcher.create_window(|_, _, _, _| 0, 0);
                for seq in 0..100 {
                    if dispatcher.post_message(window, 2, seq, 0) {
                        delivered.fetch_add(1, Ordering::SeqCst);
                    }
                }
                // Posts to a live window from its own thread always land.
                assert!(dispatcher.peek_message(&MessageFilter::any(), false).is_some());
                dispatcher.destroy_window(window);
            })
        })
        .collect();

    churn.join().unwrap();
    for poster in posters {
        poster.join().unwrap();
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 200);
    assert_eq!(dispatcher.window_count(), 0);
}

#[test]
fn test_unknown_targets_never_hang() {
    let dispatcher = Dispatcher::new().unwrap();

    let stale = dispatcher.create_window(|_, _, _, _| 7, 0);
    assert!(dispatcher.destroy_window(stale));

    assert!(!dispatcher.post_message(stale, 1, 0, 0));
    assert_eq!(dispatcher.send_message(stale, 1, 0, 0), 0);
    assert_eq!(
        dispatcher.dispatch_message(&Message::to_window(stale, 1, 0, 0)),
        0
    );
    assert!(dispatcher.peek_message(&MessageFilter::any(), true).is_none());
}

#[test]
fn test_timer_messages_reach_window_owner_thread() {
    let dispatcher = Arc::new(Dispatcher::new().unwrap());
    let ticks = Arc::new(AtomicUsize::new(0));

    let tick_counter = ticks.clone();
    let (window, consumer) = spawn_owner(dispatcher.clone(), move |_, msg| {
        assert_eq!(msg.code, codes::TIMER);
        tick_counter.fetch_add(1, Ordering::SeqCst) < 2
    });

    let timer = dispatcher.set_message_timer(Some(window), Duration::from_millis(25));

    consumer.join().unwrap();
    assert!(ticks.load(Ordering::SeqCst) >= 3);
    assert!(dispatcher.kill_timer(timer));
}
