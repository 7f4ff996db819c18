use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::sync::Arc;

use anyhow::Context as _;
use image::RgbaImage;

use crate::foundation::error::{MediaError, MediaResult};
use crate::graph::input::InputSource;
use crate::graph::stream::{Graph, Node, StreamId, StreamKind, Target};

/// First descriptor number handed to the child for extra inputs/outputs.
pub const FIRST_CHILD_FD: i32 = 3;

/// Global flags placed before every input.
const GLOBAL_ARGS: [&str; 3] = ["-y", "-loglevel", "error"];

/// Data that has to reach the child on an inherited descriptor.
#[derive(Debug)]
pub enum FdSource {
    /// Duplicate of a caller-owned handle.
    File(File),
    /// Image to encode as PNG into a pipe while the child runs.
    Image(Arc<RgbaImage>),
}

/// Descriptor the runner must install in the child.
#[derive(Debug)]
pub struct FdInput {
    /// Descriptor number inside the child.
    pub child_fd: i32,
    /// What to connect to it.
    pub source: FdSource,
}

/// A compiled invocation: argument vector plus the descriptors it refers to.
#[derive(Debug)]
pub struct Cmd {
    args: Vec<OsString>,
    fds: Vec<FdInput>,
    stdout: bool,
}

impl Cmd {
    /// Arguments, not including the program name.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Extra descriptors referenced by the arguments.
    pub fn fds(&self) -> &[FdInput] {
        &self.fds
    }

    /// Whether an output was mapped to standard output.
    pub fn captures_stdout(&self) -> bool {
        self.stdout
    }

    /// In-memory images the job will stream in, in input order.
    pub fn images(&self) -> impl Iterator<Item = &RgbaImage> {
        self.fds.iter().filter_map(|fd| match &fd.source {
            FdSource::Image(img) => Some(img.as_ref()),
            FdSource::File(_) => None,
        })
    }

    /// Value following the first occurrence of `flag`.
    pub fn arg_after(&self, flag: &str) -> Option<&OsStr> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(OsString::as_os_str)
    }

    /// The `-filter_complex` expression, if any.
    pub fn filter_complex(&self) -> Option<String> {
        self.arg_after("-filter_complex")
            .map(|s| s.to_string_lossy().into_owned())
    }

    /// Space-joined argument line for logs.
    pub fn display_args(&self) -> String {
        self.args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn into_parts(self) -> (Vec<OsString>, Vec<FdInput>, bool) {
        (self.args, self.fds, self.stdout)
    }
}

#[derive(Debug)]
enum Pad {
    /// Not visited yet.
    Pending,
    /// DFS in progress.
    Visiting,
    /// Raw input track, e.g. `0:v`.
    Raw(String),
    /// Unterminated chain that a single unary consumer may extend.
    Open(String),
    /// Chain was extended by its only consumer.
    Fused,
    /// Emitted; one label per remaining consumer, popped from the back.
    Labels(Vec<String>),
}

struct Compiler<'g> {
    graph: &'g Graph,
    pads: Vec<Pad>,
    op_labels: Vec<Option<Vec<String>>>,
    refs: Vec<u32>,
    input_order: HashMap<u32, usize>,
    chains: Vec<String>,
    next_label: u32,
}

impl Graph {
    /// Compile all registered outputs into one invocation.
    ///
    /// Each reachable stream is emitted once. A stream with several consumers is terminated
    /// with a `split`/`asplit` so every consumer gets its own pad. Labels and input indices
    /// follow output registration order, depth first, so compiling the same graph twice
    /// yields identical arguments.
    pub fn cmd(&self) -> MediaResult<Cmd> {
        if self.outputs.is_empty() {
            return Err(MediaError::graph("no outputs registered"));
        }
        let mut c = Compiler {
            graph: self,
            pads: self.nodes.iter().map(|_| Pad::Pending).collect(),
            op_labels: self.ops.iter().map(|_| None).collect(),
            refs: vec![0; self.nodes.len()],
            input_order: HashMap::new(),
            chains: Vec::new(),
            next_label: 0,
        };
        c.count_refs()?;

        let mut maps: Vec<Vec<String>> = Vec::with_capacity(self.outputs.len());
        for out in &self.outputs {
            if out.streams.is_empty() {
                return Err(MediaError::graph("output has no streams"));
            }
            let mut m = Vec::with_capacity(out.streams.len());
            for &s in &out.streams {
                c.visit(s)?;
                m.push(c.map_ref(s)?);
            }
            maps.push(m);
        }
        tracing::debug!(chains = c.chains.len(), inputs = c.input_order.len(), "graph compiled");
        c.finish(maps)
    }
}

impl Compiler<'_> {
    fn check(&self, s: StreamId) -> MediaResult<usize> {
        if s.graph != self.graph.id {
            return Err(MediaError::graph(format!(
                "stream #{} belongs to another graph",
                s.index
            )));
        }
        let i = s.index as usize;
        if i >= self.graph.nodes.len() {
            return Err(MediaError::graph(format!("unknown stream #{}", s.index)));
        }
        Ok(i)
    }

    fn node(&self, s: StreamId) -> MediaResult<&Node> {
        let i = self.check(s)?;
        Ok(&self.graph.nodes[i])
    }

    fn kind(&self, s: StreamId) -> MediaResult<StreamKind> {
        Ok(self.node(s)?.kind())
    }

    fn expect_kind(&self, s: StreamId, want: StreamKind, what: &str) -> MediaResult<()> {
        let got = self.kind(s)?;
        if got != want {
            return Err(MediaError::graph(format!(
                "{what} expects a {want:?} stream, got {got:?} stream #{}",
                s.index
            )));
        }
        Ok(())
    }

    /// Count consumers of every node reachable from the outputs. Forwards are transparent.
    fn count_refs(&mut self) -> MediaResult<()> {
        let graph = self.graph;
        let mut seen = vec![false; graph.nodes.len()];
        let mut seen_ops = vec![false; graph.ops.len()];
        let mut stack = Vec::new();
        for out in &graph.outputs {
            for &s in &out.streams {
                let i = self.check(self.resolve(s)?)?;
                self.refs[i] += 1;
                stack.push(i);
            }
        }
        while let Some(i) = stack.pop() {
            if std::mem::replace(&mut seen[i], true) {
                continue;
            }
            let upstream: &[StreamId] = match &graph.nodes[i] {
                Node::Filter { inputs, .. } => inputs,
                Node::Port { op, .. } => {
                    let o = *op as usize;
                    if o >= graph.ops.len() {
                        return Err(MediaError::graph(format!("unknown op #{op}")));
                    }
                    if std::mem::replace(&mut seen_ops[o], true) {
                        &[]
                    } else {
                        &graph.ops[o].inputs
                    }
                }
                Node::Input { .. } | Node::Forward { .. } => &[],
            };
            for &u in upstream {
                let j = self.check(self.resolve(u)?)?;
                self.refs[j] += 1;
                stack.push(j);
            }
        }
        Ok(())
    }

    /// Follow forward declarations to the producing node.
    fn resolve(&self, s: StreamId) -> MediaResult<StreamId> {
        let mut cur = s;
        for _ in 0..=self.graph.nodes.len() {
            match self.node(cur)? {
                Node::Forward {
                    target: Some(t),
                    kind,
                } => {
                    let target_kind = self.kind(*t)?;
                    if target_kind != *kind {
                        return Err(MediaError::graph(format!(
                            "stream #{} used as both {kind:?} and {target_kind:?}",
                            cur.index
                        )));
                    }
                    cur = *t;
                }
                Node::Forward { target: None, .. } => {
                    return Err(MediaError::graph(format!(
                        "forward stream #{} was never connected",
                        cur.index
                    )));
                }
                _ => return Ok(cur),
            }
        }
        Err(MediaError::graph(format!(
            "cycle detected at stream #{}",
            s.index
        )))
    }

    fn fresh_label(&mut self) -> String {
        let l = format!("s{}", self.next_label);
        self.next_label += 1;
        l
    }

    fn visit(&mut self, s: StreamId) -> MediaResult<()> {
        let s = self.resolve(s)?;
        let i = self.check(s)?;
        match self.pads[i] {
            Pad::Pending => {}
            Pad::Visiting => {
                return Err(MediaError::graph(format!(
                    "cycle detected at stream #{}",
                    s.index
                )));
            }
            _ => return Ok(()),
        }
        self.pads[i] = Pad::Visiting;

        let graph = self.graph;
        match &graph.nodes[i] {
            Node::Input { input, kind } => {
                let idx = self.input_index(*input)?;
                self.pads[i] = Pad::Raw(format!("{idx}:{}", kind.spec()));
            }
            Node::Filter { inputs, expr, kind } => {
                for &u in inputs {
                    self.expect_kind(u, *kind, expr)?;
                    self.visit(u)?;
                }
                let chain = if let [only] = inputs.as_slice() {
                    self.unary(*only, expr)?
                } else {
                    let mut chain = String::new();
                    for &u in inputs {
                        chain.push_str(&self.pad_ref(u)?);
                    }
                    chain.push_str(expr);
                    chain
                };
                self.pads[i] = Pad::Open(chain);
            }
            Node::Port { op, port, .. } => {
                self.emit_op(*op)?;
                let label = self.op_labels[*op as usize]
                    .as_ref()
                    .and_then(|ls| ls.get(*port as usize))
                    .cloned()
                    .ok_or_else(|| MediaError::graph(format!("dangling port of op #{op}")))?;
                if self.refs[i] > 1 {
                    self.terminate(i, format!("[{label}]"), false);
                } else {
                    self.pads[i] = Pad::Labels(vec![label]);
                }
            }
            Node::Forward { .. } => {
                return Err(MediaError::graph("unresolved forward stream"));
            }
        }
        Ok(())
    }

    /// Chain text for a one-input filter, fusing into the upstream chain when possible.
    fn unary(&mut self, upstream: StreamId, expr: &str) -> MediaResult<String> {
        let u = self.check(self.resolve(upstream)?)?;
        if self.refs[u] == 1 && matches!(self.pads[u], Pad::Open(_)) {
            let Pad::Open(mut chain) = std::mem::replace(&mut self.pads[u], Pad::Fused) else {
                return Err(MediaError::graph("open chain vanished"));
            };
            chain.push(',');
            chain.push_str(expr);
            return Ok(chain);
        }
        Ok(format!("{}{expr}", self.pad_ref(upstream)?))
    }

    fn emit_op(&mut self, op: u32) -> MediaResult<()> {
        let oi = op as usize;
        if self.op_labels[oi].is_some() {
            return Ok(());
        }
        let graph = self.graph;
        let m = &graph.ops[oi];
        if m.inputs.len() != m.expects.len() {
            return Err(MediaError::graph(format!(
                "{} expects {} inputs, got {}",
                m.expr,
                m.expects.len(),
                m.inputs.len()
            )));
        }
        for (&u, &want) in m.inputs.iter().zip(&m.expects) {
            self.expect_kind(u, want, &m.expr)?;
            self.visit(u)?;
        }
        let mut chain = if let [only] = m.inputs.as_slice() {
            self.unary(*only, &m.expr)?
        } else {
            let mut chain = String::new();
            for &u in &m.inputs {
                chain.push_str(&self.pad_ref(u)?);
            }
            chain.push_str(&m.expr);
            chain
        };
        let labels: Vec<String> = m.outputs.iter().map(|_| self.fresh_label()).collect();
        for l in &labels {
            push_label(&mut chain, l);
        }
        self.chains.push(chain);
        // Every output pad must be consumed, so unused ports are drained.
        for (i, node) in graph.nodes.iter().enumerate() {
            if let Node::Port { op: o, port, kind } = node {
                if *o == op && self.refs[i] == 0 {
                    let sink = match kind {
                        StreamKind::Video => "nullsink",
                        StreamKind::Audio => "anullsink",
                    };
                    self.chains.push(format!("[{}]{sink}", labels[*port as usize]));
                }
            }
        }
        self.op_labels[oi] = Some(labels);
        Ok(())
    }

    /// Finish `chain` as the producer of node `i`: one label, or a split with one label
    /// per consumer.
    fn terminate(&mut self, i: usize, mut chain: String, fuse: bool) {
        let consumers = self.refs[i].max(1);
        if consumers > 1 {
            if fuse {
                chain.push(',');
            }
            let split = match self.graph.nodes[i].kind() {
                StreamKind::Video => "split",
                StreamKind::Audio => "asplit",
            };
            chain.push_str(&format!("{split}={consumers}"));
        }
        let mut labels: Vec<String> = (0..consumers).map(|_| self.fresh_label()).collect();
        for l in &labels {
            push_label(&mut chain, l);
        }
        self.chains.push(chain);
        labels.reverse();
        self.pads[i] = Pad::Labels(labels);
    }

    /// Bracketed pad reference for one consumer, closing an open chain first.
    fn pad_ref(&mut self, s: StreamId) -> MediaResult<String> {
        let i = self.check(self.resolve(s)?)?;
        if matches!(self.pads[i], Pad::Open(_)) {
            let Pad::Open(chain) = std::mem::replace(&mut self.pads[i], Pad::Pending) else {
                return Err(MediaError::graph("open chain vanished"));
            };
            self.terminate(i, chain, true);
        }
        match &mut self.pads[i] {
            Pad::Raw(r) => Ok(format!("[{r}]")),
            Pad::Labels(ls) => ls.pop().map(|l| format!("[{l}]")).ok_or_else(|| {
                MediaError::graph(format!("stream #{} has more consumers than pads", s.index))
            }),
            Pad::Fused => Err(MediaError::graph(format!(
                "stream #{} was fused into another chain",
                s.index
            ))),
            Pad::Pending | Pad::Visiting | Pad::Open(_) => Err(MediaError::graph(format!(
                "stream #{} referenced before it was compiled",
                s.index
            ))),
        }
    }

    /// `-map` value for an output stream.
    fn map_ref(&mut self, s: StreamId) -> MediaResult<String> {
        let i = self.check(self.resolve(s)?)?;
        if let Pad::Raw(r) = &self.pads[i] {
            return Ok(r.clone());
        }
        self.pad_ref(s)
    }

    fn input_index(&mut self, input: u32) -> MediaResult<usize> {
        if input as usize >= self.graph.inputs.len() {
            return Err(MediaError::graph("stream refers to an unknown input"));
        }
        let next = self.input_order.len();
        Ok(*self.input_order.entry(input).or_insert(next))
    }

    fn finish(self, maps: Vec<Vec<String>>) -> MediaResult<Cmd> {
        let graph = self.graph;
        let mut args: Vec<OsString> = GLOBAL_ARGS.iter().map(OsString::from).collect();
        let mut fds = Vec::new();
        let mut next_fd = FIRST_CHILD_FD;

        let mut order: Vec<(usize, u32)> =
            self.input_order.iter().map(|(&inp, &idx)| (idx, inp)).collect();
        order.sort_unstable();
        for (_, inp) in order {
            let input = &graph.inputs[inp as usize];
            match &input.source {
                InputSource::Image(_) => {
                    args.push("-f".into());
                    args.push("png_pipe".into());
                }
                InputSource::Path(_) | InputSource::Handle(_) => {}
            }
            args.extend(input.options.iter().cloned());
            args.push("-i".into());
            match &input.source {
                InputSource::Path(p) => args.push(p.clone().into_os_string()),
                InputSource::Handle(f) => {
                    let dup = f.try_clone().context("duplicate input handle")?;
                    args.push(format!("/dev/fd/{next_fd}").into());
                    fds.push(FdInput {
                        child_fd: next_fd,
                        source: FdSource::File(dup),
                    });
                    next_fd += 1;
                }
                InputSource::Image(img) => {
                    args.push(format!("pipe:{next_fd}").into());
                    fds.push(FdInput {
                        child_fd: next_fd,
                        source: FdSource::Image(Arc::clone(img)),
                    });
                    next_fd += 1;
                }
            }
        }

        if !self.chains.is_empty() {
            args.push("-filter_complex".into());
            args.push(self.chains.join(";").into());
        }

        let mut stdout = false;
        for (out, map) in graph.outputs.iter().zip(maps) {
            for m in map {
                args.push("-map".into());
                args.push(m.into());
            }
            args.extend(out.args.iter().cloned());
            match &out.target {
                Target::Path(p) => args.push(p.clone().into_os_string()),
                Target::Handle(f) => {
                    let dup = f.try_clone().context("duplicate output handle")?;
                    args.push(format!("/dev/fd/{next_fd}").into());
                    fds.push(FdInput {
                        child_fd: next_fd,
                        source: FdSource::File(dup),
                    });
                    next_fd += 1;
                }
                Target::Stdout => {
                    if stdout {
                        return Err(MediaError::graph("only one output may use stdout"));
                    }
                    stdout = true;
                    args.push("pipe:1".into());
                }
            }
        }

        Ok(Cmd { args, fds, stdout })
    }
}

fn push_label(chain: &mut String, label: &str) {
    chain.push('[');
    chain.push_str(label);
    chain.push(']');
}

#[cfg(test)]
#[path = "../../tests/unit/graph/compile.rs"]
mod tests;
