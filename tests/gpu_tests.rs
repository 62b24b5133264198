// SPDX-License-Identifier: MPL-2.0

//! GPU backend integration tests
//!
//! These need a GPU adapter and pass trivially (with a message) without one.

use nv12_effect::backends::{SoftwareBackend, WgpuBackend};
use nv12_effect::gpu::wgpu;
use nv12_effect::{Effect, FrameOutcome, Nv12EffectFilter, ReadbackPolicy, VideoFrame};

fn gpu_backend() -> Option<WgpuBackend> {
    match WgpuBackend::new(wgpu::PowerPreference::HighPerformance) {
        Ok(backend) => Some(backend),
        Err(e) => {
            println!("Skipping test (no GPU): {}", e);
            None
        }
    }
}

fn pattern_frame(width: u32, height: u32, seed: usize) -> Vec<u8> {
    let luma = (width * height) as usize;
    let mut data: Vec<u8> = (0..luma)
        .map(|i| 16 + ((i + seed) * 7 % 220) as u8)
        .collect();
    for block in 0..luma / 4 {
        data.push(16 + ((block + seed) * 29 % 225) as u8);
        data.push(16 + ((block + seed) * 53 % 225) as u8);
    }
    data
}

#[tokio::test]
async fn test_gpu_matches_software_reference() {
    // Width not a multiple of 64 pixels exercises the padded readback rows
    let (width, height) = (36u32, 10u32);

    for effect in [Effect::Identity, Effect::Grayscale] {
        let Some(backend) = gpu_backend() else {
            return;
        };
        let mut gpu = Nv12EffectFilter::new(backend, effect, ReadbackPolicy::Synchronous);
        let mut cpu =
            Nv12EffectFilter::new(SoftwareBackend::new(), effect, ReadbackPolicy::Synchronous);

        let mut gpu_frame = pattern_frame(width, height, 3);
        let mut cpu_frame = gpu_frame.clone();
        gpu.process_frame(&mut VideoFrame::new(width, height, &mut gpu_frame))
            .unwrap();
        cpu.process_frame(&mut VideoFrame::new(width, height, &mut cpu_frame))
            .unwrap();

        for (i, (g, c)) in gpu_frame.iter().zip(&cpu_frame).enumerate() {
            assert!(
                g.abs_diff(*c) <= 1,
                "{:?} byte {}: gpu {} cpu {}",
                effect,
                i,
                g,
                c
            );
        }
    }
}

#[tokio::test]
async fn test_gpu_pipelined_stream_matches_software() {
    let (width, height) = (36u32, 10u32);
    let Some(backend) = gpu_backend() else {
        return;
    };
    let mut gpu = Nv12EffectFilter::new(backend, Effect::Grayscale, ReadbackPolicy::Pipelined);
    let mut cpu = Nv12EffectFilter::new(
        SoftwareBackend::new(),
        Effect::Grayscale,
        ReadbackPolicy::Pipelined,
    );

    // Each read overlaps the next frame's draw and copy
    for seed in 0..5 {
        let mut gpu_frame = pattern_frame(width, height, seed * 11);
        let mut cpu_frame = gpu_frame.clone();
        let gpu_outcome = gpu
            .process_frame(&mut VideoFrame::new(width, height, &mut gpu_frame))
            .unwrap();
        let cpu_outcome = cpu
            .process_frame(&mut VideoFrame::new(width, height, &mut cpu_frame))
            .unwrap();
        assert_eq!(gpu_outcome, cpu_outcome);
        assert_eq!(
            gpu_outcome,
            if seed == 0 {
                FrameOutcome::Primed
            } else {
                FrameOutcome::Filtered
            }
        );
        for (i, (g, c)) in gpu_frame.iter().zip(&cpu_frame).enumerate() {
            assert!(g.abs_diff(*c) <= 1, "frame {} byte {}: gpu {} cpu {}", seed, i, g, c);
        }
    }

    let mut gpu_last = vec![0u8; (width * height * 3 / 2) as usize];
    let mut cpu_last = gpu_last.clone();
    assert!(
        gpu.flush(&mut VideoFrame::new(width, height, &mut gpu_last))
            .unwrap()
    );
    assert!(
        cpu.flush(&mut VideoFrame::new(width, height, &mut cpu_last))
            .unwrap()
    );
    for (i, (g, c)) in gpu_last.iter().zip(&cpu_last).enumerate() {
        assert!(g.abs_diff(*c) <= 1, "flushed byte {}: gpu {} cpu {}", i, g, c);
    }
    assert_eq!(gpu.frames_filtered(), 5);
    assert_eq!(gpu.frames_dropped(), 0);
}

#[tokio::test]
async fn test_gpu_pipelined_flush_and_resize() {
    let Some(backend) = gpu_backend() else {
        return;
    };
    let mut filter = Nv12EffectFilter::new(backend, Effect::Grayscale, ReadbackPolicy::Pipelined);

    let mut first = pattern_frame(64, 32, 0);
    let outcome = filter
        .process_frame(&mut VideoFrame::new(64, 32, &mut first))
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Primed);
    // 64 * 4 is already row aligned
    assert_eq!(filter.staging_buffer_sizes(), vec![8192, 8192]);

    let mut pending = vec![0u8; 64 * 32 * 3 / 2];
    assert!(
        filter
            .flush(&mut VideoFrame::new(64, 32, &mut pending))
            .unwrap()
    );
    assert!(pending[64 * 32..].iter().all(|c| c.abs_diff(128) <= 1));

    // 10 * 4 = 40 bytes per row, padded to 256
    let mut small = pattern_frame(10, 4, 1);
    filter
        .process_frame(&mut VideoFrame::new(10, 4, &mut small))
        .unwrap();
    assert_eq!(filter.staging_buffer_sizes(), vec![1024, 1024]);
    assert_eq!(filter.frames_dropped(), 0);

    filter.close();
    assert_eq!(filter.stats().live_total(), 0);
    // The 10x4 frame was closed without a flush
    assert_eq!(filter.frames_dropped(), 1);
}
