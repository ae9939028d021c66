//! Render pump
//!
//! A dedicated thread owns the `PlaybackGraph` and keeps the output ring
//! topped up. It drains pending commands, renders a block whenever the ring
//! has room, and reports buffer completions back to the control context.
//! It never blocks on the control context. A running voice that cannot fill
//! a whole block waits for its next chunk instead of rendering a gap, and
//! the pump sleeps briefly when no voice can play. With no voice running
//! nothing is rendered and the device plays silence.

use super::{GraphCommand, PlaybackGraph, RenderEvent};
use crate::audio::{AudioFrame, AudioProducer};
use crate::error::{Error, Result};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Frames rendered per pass
pub const RENDER_BLOCK_FRAMES: usize = 256;
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Control-side handle on the render thread
pub struct GraphHandle {
    commands: UnboundedSender<GraphCommand>,
    thread: Option<JoinHandle<()>>,
}

impl GraphHandle {
    /// Start the render thread writing into `producer` at `output_rate`
    pub fn spawn(
        output_rate: u32,
        producer: AudioProducer,
        events: UnboundedSender<RenderEvent>,
    ) -> Result<Self> {
        let (commands, rx) = mpsc::unbounded_channel();
        let graph = PlaybackGraph::new(output_rate);

        let thread = thread::Builder::new()
            .name("lyra-render".into())
            .spawn(move || run(graph, producer, rx, events))
            .map_err(|e| Error::EngineNotRunning(format!("Failed to spawn render thread: {}", e)))?;

        info!("Render thread started at {} Hz", output_rate);
        Ok(Self {
            commands,
            thread: Some(thread),
        })
    }

    pub fn send(&self, command: GraphCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::EngineNotRunning("Render thread stopped".into()))
    }

    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the render thread and wait for it
    pub fn shutdown(&mut self) {
        let _ = self.commands.send(GraphCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Render thread panicked");
            }
        }
    }
}

impl Drop for GraphHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    mut graph: PlaybackGraph,
    mut producer: AudioProducer,
    mut commands: UnboundedReceiver<GraphCommand>,
    events: UnboundedSender<RenderEvent>,
) {
    let mut block = vec![AudioFrame::zero(); RENDER_BLOCK_FRAMES];
    let mut pending = Vec::new();

    loop {
        loop {
            match commands.try_recv() {
                Ok(GraphCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                    debug!("Render thread stopping");
                    return;
                }
                Ok(GraphCommand::AttachOutput {
                    producer: new_producer,
                    sample_rate,
                }) => {
                    debug!("Render thread attached to new output at {} Hz", sample_rate);
                    producer = new_producer;
                    graph.set_output_rate(sample_rate);
                }
                Ok(command) => graph.apply(command),
                Err(TryRecvError::Empty) => break,
            }
        }

        if !graph.has_running_voice() || producer.vacant_len() < RENDER_BLOCK_FRAMES {
            thread::sleep(IDLE_SLEEP);
            continue;
        }

        let rendered = graph.render(&mut block, &mut pending);
        if rendered {
            producer.push_slice(&block);
        }

        for event in pending.drain(..) {
            if events.send(event).is_err() {
                debug!("Control context gone, render thread stopping");
                return;
            }
        }

        if !rendered {
            thread::sleep(IDLE_SLEEP);
        }
    }
}
