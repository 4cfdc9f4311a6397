//! CPAL-based duplex backend: device input in, engine mix out.

use atomic_float::AtomicF32;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use lg_engine::{Engine, Frame, BLOCK_SIZE};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::{AudioBackend, AudioError};

/// Runs an [`Engine`] inside the output callback, fed by the default input
/// device through a ring buffer.
pub struct CpalDuplex {
    output_device: Device,
    input_device: Option<Device>,
    config: StreamConfig,
    input_channels: u16,
    streams: Vec<Stream>,
    running: Arc<AtomicBool>,
}

impl CpalDuplex {
    /// Open the default devices. No streams are built yet.
    ///
    /// A missing input device is not an error: the engine then records
    /// silence.
    pub fn open() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let output_device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = output_device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // Force stereo output; the callback interleaves two channels
        config.channels = 2;

        let input_device = host.default_input_device();
        let input_channels = match &input_device {
            Some(device) => device
                .default_input_config()
                .map(|c| c.channels())
                .map_err(|e| AudioError::DeviceInit(e.to_string()))?,
            None => {
                log::warn!("no input device, recording silence");
                0
            }
        };

        Ok(Self {
            output_device,
            input_device,
            config,
            input_channels,
            streams: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Build both streams and move the engine into the output callback.
    ///
    /// `bpm` is watched once per callback so tempo changes from the control
    /// side reach the transport.
    pub fn build_streams(&mut self, engine: Engine, bpm: Arc<AtomicF32>) -> Result<(), AudioError> {
        // about 100ms of input slack
        let capacity = (self.config.sample_rate.0 as usize / 10).max(BLOCK_SIZE) * 2;
        let (mut producer, consumer) = HeapRb::<Frame>::new(capacity).split();

        if let Some(device) = &self.input_device {
            let channels = self.input_channels.max(1) as usize;
            let input_config = StreamConfig {
                channels: self.input_channels.max(1),
                sample_rate: self.config.sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            let stream = device
                .build_input_stream(
                    &input_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        for chunk in data.chunks(channels) {
                            let frame = match chunk {
                                [left, right, ..] => Frame::new(*left, *right),
                                [mono] => Frame::mono(*mono),
                                [] => Frame::silence(),
                            };
                            // drop input the engine has not caught up with
                            let _ = producer.try_push(frame);
                        }
                    },
                    |err| log::error!("input stream error: {}", err),
                    None,
                )
                .map_err(|e| AudioError::StreamCreate(e.to_string()))?;
            self.streams.push(stream);
        }

        let mut render = DuplexRender::new(engine, consumer, bpm);
        let running = self.running.clone();
        let channels = self.config.channels as usize;
        let stream = self
            .output_device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = 0.0;
                        }
                        return;
                    }
                    #[cfg(feature = "alloc_check")]
                    assert_no_alloc::assert_no_alloc(|| render.fill(data, channels));
                    #[cfg(not(feature = "alloc_check"))]
                    render.fill(data, channels);
                },
                |err| log::error!("output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;
        self.streams.push(stream);

        for stream in &self.streams {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        log::info!(
            "audio running at {} Hz ({} input channels)",
            self.config.sample_rate.0,
            self.input_channels
        );
        Ok(())
    }
}

impl AudioBackend for CpalDuplex {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        for stream in &self.streams {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        for stream in &self.streams {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}

/// State owned by the output callback. Scratch is sized once up front.
struct DuplexRender {
    engine: Engine,
    input: HeapCons<Frame>,
    bpm: Arc<AtomicF32>,
    in_block: Vec<Frame>,
    out_block: Vec<Frame>,
}

impl DuplexRender {
    fn new(engine: Engine, input: HeapCons<Frame>, bpm: Arc<AtomicF32>) -> Self {
        Self {
            engine,
            input,
            bpm,
            in_block: vec![Frame::silence(); BLOCK_SIZE],
            out_block: vec![Frame::silence(); BLOCK_SIZE],
        }
    }

    /// Render interleaved output, one engine block at a time.
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        let bpm = self.bpm.load(Ordering::Relaxed);
        if bpm != self.engine.transport().bpm() {
            self.engine.set_bpm(bpm);
        }

        for chunk in data.chunks_mut(channels * BLOCK_SIZE) {
            let frames = chunk.len() / channels;
            for slot in &mut self.in_block[..frames] {
                *slot = self.input.try_pop().unwrap_or_default();
            }
            self.engine
                .process(&self.in_block[..frames], &mut self.out_block[..frames]);

            for (samples, frame) in chunk.chunks_mut(channels).zip(&self.out_block[..frames]) {
                // Write stereo pair; zero-fill any extra channels
                for (i, sample) in samples.iter_mut().enumerate() {
                    *sample = match i {
                        0 => frame.left,
                        1 => frame.right,
                        _ => 0.0,
                    };
                }
            }
        }
    }
}
