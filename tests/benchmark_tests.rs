//! Performance benchmarks for critical arena systems

use server::client_manager::HeldInputs;
use server::codec::{encode_client_frame, encode_text, FrameDecoder, OPCODE_TEXT};
use server::config::ArenaConfig;
use server::game::MainGame;
use server::level::generate;
use shared::{HeldInput, ServerMessage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};

/// Benchmarks a full main-game tick with four moving players
#[test]
fn benchmark_main_game_tick() {
    let start_time = Instant::now();
    let mut game = MainGame::new(&ArenaConfig {
        seed: Some(1),
        ..Default::default()
    });
    let seats: Vec<_> = (1..=4).map(|id| (id, format!("P{}", id))).collect();
    game.start(&seats, start_time);

    let mut inputs = HeldInputs::default();
    let step = Duration::from_millis(17);
    let iterations = 10_000;
    let start = Instant::now();

    let mut now = start_time;
    for i in 0..iterations {
        now += step;
        for seat in 1..=4u8 {
            inputs.set(
                seat,
                HeldInput {
                    left: i % 200 < 100,
                    right: i % 200 >= 100,
                    down: seat % 2 == 0,
                    up: seat % 2 == 1,
                    bomb: i % 300 == 0,
                },
            );
        }
        let _ = game.tick(now, step, &mut inputs);
    }

    let duration = start.elapsed();
    println!(
        "Main game tick: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // A tick has to fit comfortably inside the 17ms budget
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks level generation
#[test]
fn benchmark_level_generation() {
    let mut rng = StdRng::seed_from_u64(7);
    let iterations = 1_000;
    let start = Instant::now();

    for level in 1..=iterations {
        let layout = generate(level, 0.55, &mut rng);
        assert!(!layout.solid_walls.is_empty());
    }

    let duration = start.elapsed();
    println!(
        "Level generation: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks snapshot serialization and frame encoding
#[test]
fn benchmark_state_encoding() {
    let mut game = MainGame::new(&ArenaConfig {
        seed: Some(2),
        ..Default::default()
    });
    let seats: Vec<_> = (1..=4).map(|id| (id, format!("P{}", id))).collect();
    let payload = game.start(&seats, Instant::now());
    let message = ServerMessage::StartGame { payload };

    let iterations = 2_000;
    let start = Instant::now();

    let mut bytes = 0;
    for _ in 0..iterations {
        let text = serde_json::to_string(&message).unwrap();
        bytes += encode_text(&text).len();
    }

    let duration = start.elapsed();
    println!(
        "State encoding: {} iterations, {} bytes in {:?} ({:.2} μs/iter)",
        iterations,
        bytes,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks decoding a stream of masked client frames
#[test]
fn benchmark_frame_decoding() {
    let frame = encode_client_frame(
        OPCODE_TEXT,
        br#"{"type":"input","payload":{"left":true,"right":false,"up":false,"down":true,"bomb":false}}"#,
        [0x12, 0x34, 0x56, 0x78],
    );

    let iterations = 100_000;
    let mut decoder = FrameDecoder::new();
    let start = Instant::now();

    let mut decoded = 0;
    for _ in 0..iterations {
        decoder.extend(&frame);
        while let Ok(Some(_)) = decoder.next_frame() {
            decoded += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Frame decoding: {} frames in {:?} ({:.2} ns/frame)",
        decoded,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(decoded, iterations);
    assert!(duration.as_millis() < 2000);
}
