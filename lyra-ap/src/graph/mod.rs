//! Playback graph: source → pitch → rate → mixer
//!
//! The graph is owned by the render thread. The control context never
//! touches it directly; it sends `GraphCommand`s and receives
//! `RenderEvent`s, both by value over channels.
//!
//! Two voices exist so a crossfade can run the incoming track while the
//! outgoing one fades. Outside a crossfade one voice is active and the
//! other idle.

pub mod mixer;
pub mod pitch;
pub mod rate;
pub mod render;
pub mod source;
pub mod stretch;

pub use render::GraphHandle;
pub use source::ScheduledBuffer;

use crate::audio::{AudioFrame, AudioProducer, CHANNELS};
use lyra_common::FadeCurve;
use mixer::Mixer;
use pitch::PitchNode;
use rate::RateNode;
use source::{BufferCompletion, SourceNode};
use std::collections::VecDeque;

/// Input frames pulled from a source per pass through the nodes
const PULL_FRAMES: usize = 512;

/// One of the two voices in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceId {
    A,
    B,
}

impl VoiceId {
    pub const ALL: [VoiceId; 2] = [VoiceId::A, VoiceId::B];

    pub fn index(self) -> usize {
        match self {
            VoiceId::A => 0,
            VoiceId::B => 1,
        }
    }

    pub fn other(self) -> VoiceId {
        match self {
            VoiceId::A => VoiceId::B,
            VoiceId::B => VoiceId::A,
        }
    }
}

/// Control → render messages
pub enum GraphCommand {
    /// Prepare a voice for a track at `input_rate`, dropping all its state
    ConfigureVoice { voice: VoiceId, input_rate: u32 },
    Schedule {
        voice: VoiceId,
        buffer: ScheduledBuffer,
    },
    /// Drop queued audio and accept only `generation` from now on
    Cancel { voice: VoiceId, generation: u64 },
    SetRunning { voice: VoiceId, running: bool },
    /// Playback speed for every voice
    SetSpeed(f64),
    /// Pitch offset in semitones for every voice
    SetPitch(f64),
    SetGain { voice: VoiceId, gain: f32 },
    RampGain {
        voice: VoiceId,
        target: f32,
        frames: usize,
        curve: FadeCurve,
    },
    SetVolume(f32),
    /// Replace the output ring after an output restart
    AttachOutput {
        producer: AudioProducer,
        sample_rate: u32,
    },
    Shutdown,
}

/// Render → control messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    BufferCompleted {
        voice: VoiceId,
        generation: u64,
        chunk_index: u64,
        is_last: bool,
    },
}

struct Voice {
    source: SourceNode,
    pitch: PitchNode,
    rate: RateNode,
    running: bool,
    input_rate: u32,
    /// Output-rate samples ready for the mixer
    ready: VecDeque<f32>,
    scratch_in: Vec<f32>,
    scratch_mid: Vec<f32>,
    scratch_out: Vec<f32>,
    out: Vec<f32>,
}

impl Voice {
    fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            source: SourceNode::new(),
            pitch: PitchNode::new(input_rate, output_rate),
            rate: RateNode::new(output_rate),
            running: false,
            input_rate,
            ready: VecDeque::new(),
            scratch_in: Vec::new(),
            scratch_mid: Vec::new(),
            scratch_out: Vec::new(),
            out: Vec::new(),
        }
    }

    fn reset_nodes(&mut self) {
        self.pitch.reset();
        self.rate.reset();
        self.ready.clear();
    }

    /// Running, short of a block, and more audio is expected
    fn is_starved(&self, frames: usize) -> bool {
        self.running && self.ready.len() < frames * CHANNELS && !self.source.is_ended()
    }

    /// Pull until `frames` frames are ready or the source has nothing left
    fn fill(&mut self, frames: usize, completions: &mut Vec<BufferCompletion>) {
        let wanted = frames * CHANNELS;

        while self.ready.len() < wanted {
            self.scratch_in.clear();
            let pulled = self.source.pull(&mut self.scratch_in, PULL_FRAMES, completions);
            if pulled == 0 {
                break;
            }
            self.scratch_mid.clear();
            self.pitch.process(&self.scratch_in, &mut self.scratch_mid);
            self.scratch_out.clear();
            self.rate.process(&self.scratch_mid, &mut self.scratch_out);
            self.ready.extend(self.scratch_out.iter().copied());
        }
    }

    /// Move one block of ready audio into `self.out`
    ///
    /// Only an ended source comes up short; its tail is padded with silence.
    fn take_block(&mut self, frames: usize) {
        let wanted = frames * CHANNELS;
        self.out.clear();
        let take = wanted.min(self.ready.len());
        self.out.extend(self.ready.drain(..take));
        self.out.resize(wanted, 0.0);
    }
}

/// The node graph as seen by the render thread
pub struct PlaybackGraph {
    voices: [Voice; 2],
    mixer: Mixer,
    output_rate: u32,
    completions: Vec<BufferCompletion>,
}

impl PlaybackGraph {
    pub fn new(output_rate: u32) -> Self {
        Self {
            voices: [
                Voice::new(output_rate, output_rate),
                Voice::new(output_rate, output_rate),
            ],
            mixer: Mixer::new(2),
            output_rate,
            completions: Vec::new(),
        }
    }

    pub fn set_output_rate(&mut self, output_rate: u32) {
        if output_rate == self.output_rate {
            return;
        }
        self.output_rate = output_rate;
        for voice in &mut self.voices {
            let input_rate = voice.input_rate;
            voice.pitch.configure(input_rate, output_rate);
            voice.rate.configure(output_rate);
            voice.ready.clear();
        }
    }

    pub fn queued_frames(&self, voice: VoiceId) -> usize {
        self.voices[voice.index()].source.queued_frames()
    }

    pub fn has_running_voice(&self) -> bool {
        self.voices.iter().any(|v| v.running)
    }

    /// `voice` is waiting on its next chunk and cannot fill a block
    pub fn is_starved(&self, voice: VoiceId, frames: usize) -> bool {
        self.voices[voice.index()].is_starved(frames)
    }

    /// Apply a command; output attachment and shutdown belong to the render loop
    pub fn apply(&mut self, command: GraphCommand) {
        match command {
            GraphCommand::ConfigureVoice { voice, input_rate } => {
                let output_rate = self.output_rate;
                let v = &mut self.voices[voice.index()];
                v.input_rate = input_rate;
                v.pitch.configure(input_rate, output_rate);
                v.rate.reset();
                v.ready.clear();
                v.running = false;
            }
            GraphCommand::Schedule { voice, buffer } => {
                self.voices[voice.index()].source.schedule(buffer);
            }
            GraphCommand::Cancel { voice, generation } => {
                let v = &mut self.voices[voice.index()];
                v.source.cancel(generation);
                v.reset_nodes();
            }
            GraphCommand::SetRunning { voice, running } => {
                self.voices[voice.index()].running = running;
            }
            GraphCommand::SetSpeed(speed) => {
                for v in &mut self.voices {
                    v.rate.set_speed(speed);
                }
            }
            GraphCommand::SetPitch(semitones) => {
                for v in &mut self.voices {
                    v.pitch.set_semitones(semitones);
                }
            }
            GraphCommand::SetGain { voice, gain } => {
                if let Some(ramp) = self.mixer.gain_mut(voice.index()) {
                    ramp.set(gain);
                }
            }
            GraphCommand::RampGain {
                voice,
                target,
                frames,
                curve,
            } => {
                if let Some(ramp) = self.mixer.gain_mut(voice.index()) {
                    ramp.ramp_to(target, frames, curve);
                }
            }
            GraphCommand::SetVolume(volume) => self.mixer.set_master_volume(volume),
            GraphCommand::AttachOutput { .. } | GraphCommand::Shutdown => {}
        }
    }

    /// Render one block into `out`, collecting buffer completions
    ///
    /// A voice waiting on its next chunk sits the block out without
    /// consuming anything. Returns false, leaving `out` untouched, when no
    /// running voice can fill a block.
    pub fn render(&mut self, out: &mut [AudioFrame], events: &mut Vec<RenderEvent>) -> bool {
        let frames = out.len();

        for voice_id in VoiceId::ALL {
            let voice = &mut self.voices[voice_id.index()];
            if !voice.running {
                continue;
            }
            self.completions.clear();
            voice.fill(frames, &mut self.completions);
            events.extend(self.completions.iter().map(|c| RenderEvent::BufferCompleted {
                voice: voice_id,
                generation: c.generation,
                chunk_index: c.chunk_index,
                is_last: c.is_last,
            }));
        }

        let playing = VoiceId::ALL.map(|id| {
            let voice = &self.voices[id.index()];
            voice.running && !voice.is_starved(frames)
        });
        if !playing.iter().any(|p| *p) {
            return false;
        }

        for voice_id in VoiceId::ALL {
            if playing[voice_id.index()] {
                self.voices[voice_id.index()].take_block(frames);
            }
        }

        let [a, b] = &self.voices;
        let inputs = [
            playing[0].then_some(a.out.as_slice()),
            playing[1].then_some(b.out.as_slice()),
        ];
        self.mixer.mix(&inputs, out);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(generation: u64, chunk_index: u64, frames: usize, value: f32, is_last: bool) -> ScheduledBuffer {
        ScheduledBuffer {
            generation,
            chunk_index,
            samples: vec![value; frames * CHANNELS],
            is_last,
        }
    }

    #[test]
    fn test_render_plays_scheduled_audio_and_reports_completion() {
        let mut graph = PlaybackGraph::new(8000);
        graph.apply(GraphCommand::ConfigureVoice {
            voice: VoiceId::A,
            input_rate: 8000,
        });
        graph.apply(GraphCommand::Schedule {
            voice: VoiceId::A,
            buffer: buffer(0, 0, 100, 0.5, true),
        });
        graph.apply(GraphCommand::SetRunning {
            voice: VoiceId::A,
            running: true,
        });

        let mut out = vec![AudioFrame::zero(); 256];
        let mut events = Vec::new();
        assert!(graph.render(&mut out, &mut events));

        assert_eq!(out[0], AudioFrame::from_stereo(0.5, 0.5));
        assert_eq!(out[99], AudioFrame::from_stereo(0.5, 0.5));
        assert_eq!(out[100], AudioFrame::zero());
        assert_eq!(
            events,
            vec![RenderEvent::BufferCompleted {
                voice: VoiceId::A,
                generation: 0,
                chunk_index: 0,
                is_last: true
            }]
        );
        assert!(!graph.is_starved(VoiceId::A, 256));
    }

    #[test]
    fn test_stopped_voice_does_not_consume() {
        let mut graph = PlaybackGraph::new(8000);
        graph.apply(GraphCommand::Schedule {
            voice: VoiceId::B,
            buffer: buffer(0, 0, 100, 0.5, false),
        });

        let mut out = vec![AudioFrame::zero(); 64];
        let mut events = Vec::new();
        assert!(!graph.render(&mut out, &mut events));

        assert!(events.is_empty());
        assert_eq!(graph.queued_frames(VoiceId::B), 100);
        assert!(out.iter().all(|f| *f == AudioFrame::zero()));
    }

    #[test]
    fn test_starvation_and_cancel() {
        let mut graph = PlaybackGraph::new(8000);
        graph.apply(GraphCommand::Schedule {
            voice: VoiceId::A,
            buffer: buffer(0, 0, 10, 0.1, false),
        });
        graph.apply(GraphCommand::SetRunning {
            voice: VoiceId::A,
            running: true,
        });

        let mut out = vec![AudioFrame::zero(); 64];
        let mut events = Vec::new();
        assert!(!graph.render(&mut out, &mut events), "a short chunk is held back");
        assert_eq!(events.len(), 1);
        assert!(graph.is_starved(VoiceId::A, 64), "more chunks are expected");

        graph.apply(GraphCommand::Cancel {
            voice: VoiceId::A,
            generation: 1,
        });
        graph.apply(GraphCommand::Schedule {
            voice: VoiceId::A,
            buffer: buffer(0, 1, 10, 0.1, false),
        });
        assert_eq!(graph.queued_frames(VoiceId::A), 0);
    }

    fn running_voice(graph: &mut PlaybackGraph, voice: VoiceId) {
        graph.apply(GraphCommand::ConfigureVoice {
            voice,
            input_rate: 8000,
        });
        graph.apply(GraphCommand::SetRunning {
            voice,
            running: true,
        });
    }

    #[test]
    fn test_back_to_back_chunks_play_without_gaps() {
        let mut graph = PlaybackGraph::new(8000);
        running_voice(&mut graph, VoiceId::A);
        graph.apply(GraphCommand::Schedule {
            voice: VoiceId::A,
            buffer: buffer(0, 0, 600, 0.5, false),
        });

        // Drive the graph the way the render thread does, scheduling the
        // next chunk only once the first reports completion
        let mut heard = Vec::new();
        let mut out = vec![AudioFrame::zero(); 256];
        let mut second_scheduled = false;
        for _ in 0..16 {
            let mut events = Vec::new();
            if graph.render(&mut out, &mut events) {
                heard.extend_from_slice(&out);
            }
            let first_done = events.iter().any(|e| {
                matches!(e, RenderEvent::BufferCompleted { chunk_index: 0, .. })
            });
            if first_done && !second_scheduled {
                graph.apply(GraphCommand::Schedule {
                    voice: VoiceId::A,
                    buffer: buffer(0, 1, 600, 0.5, true),
                });
                second_scheduled = true;
            }
        }

        assert!(second_scheduled);
        assert!(heard.len() >= 1200);
        let silent = heard[..1200]
            .iter()
            .filter(|f| **f != AudioFrame::from_stereo(0.5, 0.5))
            .count();
        assert_eq!(silent, 0);
        assert_eq!(heard[1200], AudioFrame::zero(), "the last chunk ends the voice");
    }

    #[test]
    fn test_starved_voice_does_not_stall_the_other() {
        let mut graph = PlaybackGraph::new(8000);
        running_voice(&mut graph, VoiceId::A);
        running_voice(&mut graph, VoiceId::B);
        graph.apply(GraphCommand::Schedule {
            voice: VoiceId::A,
            buffer: buffer(0, 0, 1000, 0.25, false),
        });
        graph.apply(GraphCommand::Schedule {
            voice: VoiceId::B,
            buffer: buffer(0, 0, 10, 0.5, false),
        });

        let mut out = vec![AudioFrame::zero(); 256];
        let mut events = Vec::new();
        assert!(graph.render(&mut out, &mut events));
        assert!(graph.is_starved(VoiceId::B, 256));
        assert!(!graph.is_starved(VoiceId::A, 256));
        assert!(out.iter().all(|f| *f == AudioFrame::from_stereo(0.25, 0.25)));

        // B kept its frames for when its next chunk arrives
        graph.apply(GraphCommand::Schedule {
            voice: VoiceId::B,
            buffer: buffer(0, 1, 1000, 0.5, false),
        });
        assert!(graph.render(&mut out, &mut events));
        assert_eq!(out[0], AudioFrame::from_stereo(0.75, 0.75));
    }

    #[test]
    fn test_voice_id() {
        assert_eq!(VoiceId::A.other(), VoiceId::B);
        assert_eq!(VoiceId::B.index(), 1);
    }
}
