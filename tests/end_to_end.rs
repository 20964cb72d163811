//! Two-endpoint scenarios exercising the engine end to end: no transport is
//! involved, packets are routed directly between two [`Endpoint`]s in
//! memory, with time advanced manually so the tests run instantly.

use std::{cell::RefCell, rc::Rc};

use fecshim::{Endpoint, Interface, Settings, SKEY_BYTES};
use rand::{rngs::StdRng, Rng, SeedableRng};
use web_time::{Duration, Instant};

#[derive(Default)]
struct Capture {
    sent: Vec<Vec<u8>>,
    delivered: Vec<Vec<u8>>,
}

struct Recorder(Rc<RefCell<Capture>>);

impl Interface for Recorder {
    fn on_packet(&mut self, payload: &[u8]) {
        self.0.borrow_mut().delivered.push(payload.to_vec());
    }

    fn on_oob(&mut self, _payload: &[u8]) {}

    fn send_data(&mut self, packet: &[u8]) {
        self.0.borrow_mut().sent.push(packet.to_vec());
    }
}

fn endpoint(initiator: bool, secret: &[u8; SKEY_BYTES], now: Instant) -> (Endpoint, Rc<RefCell<Capture>>) {
    let capture = Rc::new(RefCell::new(Capture::default()));
    let settings = Settings::new(initiator, Box::new(Recorder(capture.clone())))
        .with_delay_bounds(Duration::from_millis(5), Duration::from_millis(200));
    let endpoint = Endpoint::initialize(secret, settings, now).unwrap();
    (endpoint, capture)
}

fn take_outgoing(capture: &Rc<RefCell<Capture>>) -> Vec<Vec<u8>> {
    capture.borrow_mut().sent.drain(..).collect()
}

/// Scenario 1: lossless link, many payloads, strict order and content match.
#[test]
fn lossless_round_trip_preserves_order_and_content() {
    let secret = [11u8; SKEY_BYTES];
    let mut now = Instant::now();
    let (mut a, a_out) = endpoint(true, &secret, now);
    let (mut b, b_out) = endpoint(false, &secret, now);

    let mut rng = StdRng::seed_from_u64(42);
    let mut expected = Vec::new();

    for i in 0..500u32 {
        let len = rng.gen_range(1..200);
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        a.send(&payload, now).unwrap();
        expected.push(payload);

        if i % 10 == 0 {
            now += Duration::from_millis(5);
            a.tick(now);
            b.tick(now);
        }

        for packet in take_outgoing(&a_out) {
            b.recv(&packet, now);
        }
        for packet in take_outgoing(&b_out) {
            a.recv(&packet, now);
        }
    }

    now += Duration::from_millis(500);
    a.tick(now);
    b.tick(now);
    for packet in take_outgoing(&a_out) {
        b.recv(&packet, now);
    }

    let delivered = b_out.borrow().delivered.clone();
    assert_eq!(delivered, expected);
}

/// Scenario 2: independent per-packet drop on the A->B direction. FEC should
/// recover the overwhelming majority of the loss.
#[test]
fn independent_loss_is_mostly_recovered() {
    let secret = [22u8; SKEY_BYTES];
    let mut now = Instant::now();
    let (mut a, a_out) = endpoint(true, &secret, now);
    let (mut b, b_out) = endpoint(false, &secret, now);

    let mut rng = StdRng::seed_from_u64(7);
    let mut expected = Vec::new();

    for i in 0..2000u32 {
        let payload = vec![(i % 251) as u8; 64];
        a.send(&payload, now).unwrap();
        expected.push(payload);

        now += Duration::from_millis(2);
        if i % 20 == 0 {
            a.tick(now);
            b.tick(now);
        }

        for packet in take_outgoing(&a_out) {
            if rng.gen_bool(0.05) {
                continue; // dropped in flight
            }
            b.recv(&packet, now);
        }
        // let pongs flow back so A's redundancy planning reacts to loss
        for packet in take_outgoing(&b_out) {
            a.recv(&packet, now);
        }
    }

    now += Duration::from_secs(1);
    a.tick(now);
    b.tick(now);
    for packet in take_outgoing(&a_out) {
        b.recv(&packet, now);
    }

    let delivered = b_out.borrow().delivered.clone();
    let delivered_set: std::collections::HashSet<_> = delivered.iter().collect();
    let missing = expected.iter().filter(|p| !delivered_set.contains(p)).count();

    // with 5% independent loss and proactive FEC, residual loss should be
    // well under the raw drop rate
    assert!(
        missing * 100 < expected.len() * 3,
        "expected under 3% residual loss, got {missing}/{}",
        expected.len()
    );
}

/// Scenario 5: an attacker flips a bit in every other packet. Tampered
/// packets never reach `OnPacket` and are counted as drops, not as
/// recovered losses.
#[test]
fn tampered_packets_are_dropped_not_delivered() {
    let secret = [33u8; SKEY_BYTES];
    let now = Instant::now();
    let (mut a, a_out) = endpoint(true, &secret, now);
    let (mut b, b_out) = endpoint(false, &secret, now);

    for i in 0..20u32 {
        a.send(&i.to_le_bytes(), now).unwrap();
    }

    let mut tampered_count = 0;
    for (i, mut packet) in take_outgoing(&a_out).into_iter().enumerate() {
        if i % 2 == 0 {
            let last = packet.len() - 1;
            packet[last] ^= 0x01;
            tampered_count += 1;
        }
        b.recv(&packet, now);
    }

    assert_eq!(b.stats().packets_dropped as usize, tampered_count);
    for payload in &b_out.borrow().delivered {
        // every delivered payload corresponds to some original 4-byte counter
        assert_eq!(payload.len(), 4);
    }
}

/// Scenario 6: sender goes idle, then resumes; the next group continues the
/// id sequence and the receiver accepts it without treating it as stale.
#[test]
fn idle_then_resume_continues_group_sequence() {
    let secret = [44u8; SKEY_BYTES];
    let mut now = Instant::now();
    let (mut a, a_out) = endpoint(true, &secret, now);
    let (mut b, b_out) = endpoint(false, &secret, now);

    a.send(b"before the idle gap", now).unwrap();
    for packet in take_outgoing(&a_out) {
        b.recv(&packet, now);
    }

    // idle for well beyond the swap interval: no new sends occur, but a
    // tick still rotates the stale group (with its lone recovery symbol,
    // if any) into the next one ahead of resuming traffic
    now += Duration::from_secs(10);
    a.tick(now);
    b.tick(now);
    for packet in take_outgoing(&a_out) {
        b.recv(&packet, now);
    }

    a.send(b"after the idle gap", now).unwrap();
    for packet in take_outgoing(&a_out) {
        b.recv(&packet, now);
    }

    let delivered = b_out.borrow().delivered.clone();
    assert_eq!(
        delivered,
        vec![b"before the idle gap".to_vec(), b"after the idle gap".to_vec()]
    );
}

/// Opposite initiator roles are required for decryption to succeed at all.
#[test]
fn matching_initiator_roles_fail_every_packet() {
    let secret = [55u8; SKEY_BYTES];
    let now = Instant::now();
    let (mut a, a_out) = endpoint(true, &secret, now);
    let (mut b, _) = endpoint(true, &secret, now); // same role as `a`, should not be done

    a.send(b"won't decrypt", now).unwrap();
    for packet in take_outgoing(&a_out) {
        b.recv(&packet, now);
    }

    assert!(b.stats().packets_dropped > 0);
    assert_eq!(b.stats().packets_received, 0);
}
