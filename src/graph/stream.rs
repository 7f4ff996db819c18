use std::ffi::OsString;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::foundation::core::fmt_num;
use crate::graph::input::Input;

static NEXT_GRAPH: AtomicU32 = AtomicU32::new(0);

/// Signal type carried by a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Video frames.
    Video,
    /// Audio samples.
    Audio,
}

impl StreamKind {
    /// Stream specifier suffix used by the tool (`v` / `a`).
    pub fn spec(self) -> &'static str {
        match self {
            Self::Video => "v",
            Self::Audio => "a",
        }
    }
}

/// Handle to an input registered with a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputId {
    pub(crate) graph: u32,
    pub(crate) index: u32,
}

/// Handle to a stream node in a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub(crate) graph: u32,
    pub(crate) index: u32,
}

#[derive(Debug)]
pub(crate) enum Node {
    /// Raw stream of an input, rendered as `[i:v]` / `[i:a]`.
    Input { input: u32, kind: StreamKind },
    /// Filter with zero (source), one or several inputs and a single output.
    Filter {
        inputs: Vec<StreamId>,
        expr: String,
        kind: StreamKind,
    },
    /// One output port of a multi-output operation.
    Port { op: u32, port: u32, kind: StreamKind },
    /// Declared now, connected later with [`Graph::connect`].
    Forward {
        target: Option<StreamId>,
        kind: StreamKind,
    },
}

impl Node {
    pub(crate) fn kind(&self) -> StreamKind {
        match self {
            Node::Input { kind, .. }
            | Node::Filter { kind, .. }
            | Node::Port { kind, .. }
            | Node::Forward { kind, .. } => *kind,
        }
    }
}

/// Filter with several output pads (`split`, `asplit`, `concat`).
#[derive(Debug)]
pub(crate) struct MultiOp {
    pub(crate) inputs: Vec<StreamId>,
    /// Kind each input must have, checked at compile time.
    pub(crate) expects: Vec<StreamKind>,
    pub(crate) expr: String,
    pub(crate) outputs: Vec<StreamKind>,
}

/// Destination of one output clause.
#[derive(Debug)]
pub enum Target {
    /// File path.
    Path(PathBuf),
    /// Open handle owned by the caller, passed to the tool as an inherited descriptor.
    Handle(File),
    /// The tool's standard output, collected by the runner.
    Stdout,
}

#[derive(Debug)]
pub(crate) struct Output {
    pub(crate) target: Target,
    pub(crate) args: Vec<OsString>,
    pub(crate) streams: Vec<StreamId>,
}

/// Arena of stream nodes for one job.
///
/// Builder methods never fail; structure is checked when the graph is compiled with
/// [`Graph::cmd`].
#[derive(Debug)]
pub struct Graph {
    pub(crate) id: u32,
    pub(crate) inputs: Vec<Input>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) ops: Vec<MultiOp>,
    pub(crate) outputs: Vec<Output>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Empty graph.
    pub fn new() -> Self {
        Self {
            id: NEXT_GRAPH.fetch_add(1, Ordering::Relaxed),
            inputs: Vec::new(),
            nodes: Vec::new(),
            ops: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn push(&mut self, node: Node) -> StreamId {
        let index = self.nodes.len() as u32;
        self.nodes.push(node);
        StreamId {
            graph: self.id,
            index,
        }
    }

    /// Kind of a stream, or `None` for a handle from another graph.
    pub fn kind(&self, s: StreamId) -> Option<StreamKind> {
        if s.graph != self.id {
            return None;
        }
        self.nodes.get(s.index as usize).map(Node::kind)
    }

    // Unknown handles default to video here; compilation reports them.
    fn kind_or_video(&self, s: StreamId) -> StreamKind {
        self.kind(s).unwrap_or(StreamKind::Video)
    }

    /// Register an input.
    pub fn input(&mut self, input: Input) -> InputId {
        let index = self.inputs.len() as u32;
        self.inputs.push(input);
        InputId {
            graph: self.id,
            index,
        }
    }

    /// Video track of an input.
    pub fn video(&mut self, input: InputId) -> StreamId {
        self.push(Node::Input {
            input: self.input_index(input),
            kind: StreamKind::Video,
        })
    }

    /// Audio track of an input.
    pub fn audio(&mut self, input: InputId) -> StreamId {
        self.push(Node::Input {
            input: self.input_index(input),
            kind: StreamKind::Audio,
        })
    }

    fn input_index(&self, input: InputId) -> u32 {
        if input.graph == self.id {
            input.index
        } else {
            u32::MAX
        }
    }

    /// Apply a single-input filter; the result has the upstream's kind.
    pub fn filter(&mut self, s: StreamId, expr: impl Into<String>) -> StreamId {
        let kind = self.kind_or_video(s);
        self.filter_n(vec![s], expr, kind)
    }

    /// Apply a filter over any number of inputs producing one stream of `kind`.
    ///
    /// Every input must carry `kind` as well.
    pub fn filter_n(
        &mut self,
        inputs: Vec<StreamId>,
        expr: impl Into<String>,
        kind: StreamKind,
    ) -> StreamId {
        self.push(Node::Filter {
            inputs,
            expr: expr.into(),
            kind,
        })
    }

    /// Source filter with no inputs, e.g. `anullsrc`.
    pub fn source(&mut self, kind: StreamKind, expr: impl Into<String>) -> StreamId {
        self.filter_n(Vec::new(), expr, kind)
    }

    /// Silent audio.
    pub fn anullsrc(&mut self) -> StreamId {
        self.source(StreamKind::Audio, "anullsrc")
    }

    /// Composite `overlay` onto `base` with its top-left corner at `(x, y)`.
    pub fn overlay(&mut self, base: StreamId, overlay: StreamId, x: i32, y: i32) -> StreamId {
        self.filter_n(
            vec![base, overlay],
            format!("overlay={x}:{y}"),
            StreamKind::Video,
        )
    }

    /// Two streams sharing one upstream pad. Picks `split` or `asplit` by kind.
    pub fn split(&mut self, s: StreamId) -> (StreamId, StreamId) {
        let kind = self.kind_or_video(s);
        let expr = match kind {
            StreamKind::Video => "split",
            StreamKind::Audio => "asplit",
        };
        let ports = self.multi(vec![s], vec![kind], expr.to_string(), vec![kind, kind]);
        (ports[0], ports[1])
    }

    /// First pass of two-stage GIF quantization.
    pub fn palette_gen(&mut self, s: StreamId) -> StreamId {
        self.filter(s, "palettegen")
    }

    /// Remap `indexed` through `palette`.
    pub fn palette_use(&mut self, indexed: StreamId, palette: StreamId) -> StreamId {
        self.filter_n(vec![indexed, palette], "paletteuse", StreamKind::Video)
    }

    /// Mix two audio streams; the result lasts as long as the first.
    pub fn amix(&mut self, main: StreamId, other: StreamId) -> StreamId {
        self.filter_n(
            vec![main, other],
            "amix=inputs=2:duration=first",
            StreamKind::Audio,
        )
    }

    /// Change audio tempo.
    pub fn atempo(&mut self, s: StreamId, tempo: f64) -> StreamId {
        self.filter(s, format!("atempo={}", fmt_num(tempo)))
    }

    /// Audio gain multiplier.
    pub fn volume(&mut self, s: StreamId, gain: f64) -> StreamId {
        self.filter(s, format!("volume={}", fmt_num(gain)))
    }

    /// Scale presentation timestamps by `factor`.
    pub fn multiply_pts(&mut self, s: StreamId, factor: f64) -> StreamId {
        self.filter(s, format!("setpts={}*PTS", fmt_num(factor)))
    }

    /// Sequence segments end to end.
    ///
    /// `streams` holds `n` segments of `video` video streams followed by `audio` audio
    /// streams each. Returns `video + audio` joined streams.
    pub fn concat(&mut self, video: u32, audio: u32, streams: Vec<StreamId>) -> Vec<StreamId> {
        let per = (video + audio).max(1) as usize;
        let n = streams.len() / per;
        let mut outputs = vec![StreamKind::Video; video as usize];
        outputs.extend(std::iter::repeat_n(StreamKind::Audio, audio as usize));
        let mut expects = Vec::with_capacity(n.max(1) * outputs.len());
        for _ in 0..n.max(1) {
            expects.extend_from_slice(&outputs);
        }
        self.multi(
            streams,
            expects,
            format!("concat=n={n}:v={video}:a={audio}"),
            outputs,
        )
    }

    fn multi(
        &mut self,
        inputs: Vec<StreamId>,
        expects: Vec<StreamKind>,
        expr: String,
        outputs: Vec<StreamKind>,
    ) -> Vec<StreamId> {
        let op = self.ops.len() as u32;
        let kinds = outputs.clone();
        self.ops.push(MultiOp {
            inputs,
            expects,
            expr,
            outputs,
        });
        kinds
            .into_iter()
            .enumerate()
            .map(|(port, kind)| {
                self.push(Node::Port {
                    op,
                    port: port as u32,
                    kind,
                })
            })
            .collect()
    }

    /// Declare a stream whose producer is attached later with [`Graph::connect`].
    pub fn forward(&mut self, kind: StreamKind) -> StreamId {
        self.push(Node::Forward { target: None, kind })
    }

    /// Point a forward declaration at its producer.
    ///
    /// Returns `false` when `forward` is not an unconnected forward of this graph.
    pub fn connect(&mut self, forward: StreamId, target: StreamId) -> bool {
        if forward.graph != self.id {
            return false;
        }
        match self.nodes.get_mut(forward.index as usize) {
            Some(Node::Forward { target: slot, .. }) if slot.is_none() => {
                *slot = Some(target);
                true
            }
            _ => false,
        }
    }

    /// Whether `s` is an untouched input track (no filter applied).
    pub fn is_input_stream(&self, s: StreamId) -> bool {
        let mut cur = s;
        for _ in 0..=self.nodes.len() {
            if cur.graph != self.id {
                return false;
            }
            match self.nodes.get(cur.index as usize) {
                Some(Node::Input { .. }) => return true,
                Some(Node::Forward {
                    target: Some(t), ..
                }) => cur = *t,
                _ => return false,
            }
        }
        false
    }

    /// Register an output written to a file path.
    pub fn add_file_output<I, A>(&mut self, path: impl Into<PathBuf>, args: I, streams: &[StreamId])
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.add_output(Target::Path(path.into()), args, streams);
    }

    /// Register an output mapping.
    pub fn add_output<I, A>(&mut self, target: Target, args: I, streams: &[StreamId])
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.outputs.push(Output {
            target,
            args: args.into_iter().map(Into::into).collect(),
            streams: streams.to_vec(),
        });
    }
}
