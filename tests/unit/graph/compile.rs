use super::*;
use crate::graph::input::Input;

fn strs(cmd: &Cmd) -> Vec<String> {
    cmd.args()
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn unary_filters_fuse_into_one_chain() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4"));
    let v = g.video(i);
    let v = g.filter(v, "scale=2:2");
    let v = g.filter(v, "hflip");
    g.add_file_output("out.mp4", ["-f", "mp4"], &[v]);

    let cmd = g.cmd().unwrap();
    assert_eq!(
        strs(&cmd),
        vec![
            "-y",
            "-loglevel",
            "error",
            "-i",
            "in.mp4",
            "-filter_complex",
            "[0:v]scale=2:2,hflip[s0]",
            "-map",
            "[s0]",
            "-f",
            "mp4",
            "out.mp4",
        ]
    );
}

#[test]
fn compiling_twice_is_byte_identical() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4").option("-ss", "3"));
    let v = g.video(i);
    let a = g.audio(i);
    let (v1, v2) = g.split(v);
    let pal = g.palette_gen(v1);
    let gif = g.palette_use(v2, pal);
    let a = g.filter(a, "areverse");
    g.add_file_output("out.gif", ["-vsync", "0"], &[gif]);
    g.add_file_output("out.m4a", Vec::<String>::new(), &[a]);

    let first = g.cmd().unwrap();
    let second = g.cmd().unwrap();
    assert_eq!(first.args(), second.args());
    assert_eq!(
        first.filter_complex().unwrap(),
        "[0:v]split[s0][s1];[s0]palettegen[s2];[s1][s2]paletteuse[s3];[0:a]areverse[s4]"
    );
}

#[test]
fn shared_stream_is_compiled_once() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4"));
    let v = g.video(i);
    let scaled = g.filter(v, "scale=320:-2");
    let flipped = g.filter(scaled, "hflip");
    g.add_file_output("a.mp4", Vec::<String>::new(), &[scaled]);
    g.add_file_output("b.mp4", Vec::<String>::new(), &[flipped]);

    let cmd = g.cmd().unwrap();
    let fc = cmd.filter_complex().unwrap();
    assert_eq!(fc.matches("scale=320:-2").count(), 1);
    assert_eq!(fc, "[0:v]scale=320:-2,split=2[s0][s1];[s1]hflip[s2]");
    let args = strs(&cmd);
    let maps: Vec<&str> = args
        .iter()
        .enumerate()
        .filter(|(_, a)| *a == "-map")
        .map(|(n, _)| args[n + 1].as_str())
        .collect();
    assert_eq!(maps, vec!["[s0]", "[s2]"]);
}

#[test]
fn raw_input_streams_map_directly() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4"));
    let v = g.video(i);
    let a = g.audio(i);
    let a = g.volume(a, 0.0);
    assert!(g.is_input_stream(v));
    assert!(!g.is_input_stream(a));
    g.add_file_output("out.mp4", ["-c:v", "copy"], &[v, a]);

    let args = strs(&g.cmd().unwrap());
    let pos = args.iter().position(|a| a == "-map").unwrap();
    assert_eq!(&args[pos..pos + 4], &["-map", "0:v", "-map", "[s0]"]);
}

#[test]
fn inputs_are_numbered_in_traversal_order() {
    let mut g = Graph::new();
    let unused = g.input(Input::path("unused.mp4"));
    let base = g.input(Input::path("base.mp4"));
    let top = g.input(Input::path("top.png"));
    let _ = unused;
    let b = g.video(base);
    let t = g.video(top);
    let o = g.overlay(b, t, 0, -10);
    g.add_file_output("out.mp4", Vec::<String>::new(), &[o]);

    let cmd = g.cmd().unwrap();
    let args = strs(&cmd);
    assert!(!args.iter().any(|a| a == "unused.mp4"));
    assert_eq!(
        cmd.filter_complex().unwrap(),
        "[0:v][1:v]overlay=0:-10[s0]"
    );
    let first_i = args.iter().position(|a| a == "-i").unwrap();
    assert_eq!(args[first_i + 1], "base.mp4");
}

#[test]
fn image_inputs_become_png_pipes() {
    let mut g = Graph::new();
    let base = g.input(Input::path("in.mp4"));
    let img = g.input(Input::image(image::RgbaImage::new(4, 6)));
    let b = g.video(base);
    let t = g.video(img);
    let o = g.overlay(b, t, 0, 0);
    g.add_file_output("out.mp4", Vec::<String>::new(), &[o]);

    let cmd = g.cmd().unwrap();
    let args = strs(&cmd);
    let pos = args.iter().position(|a| a == "png_pipe").unwrap();
    assert_eq!(&args[pos - 1..pos + 3], &["-f", "png_pipe", "-i", "pipe:3"]);
    assert_eq!(cmd.fds().len(), 1);
    assert_eq!(cmd.fds()[0].child_fd, 3);
    let imgs: Vec<_> = cmd.images().collect();
    assert_eq!(imgs[0].dimensions(), (4, 6));
}

#[test]
fn concat_wires_segments_and_outputs() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4"));
    let a = g.audio(i);
    let (a1, a2) = g.split(a);
    let head = g.filter(a1, "atrim=end=2");
    let tail = g.filter(a2, "atrim=start=2");
    let out = g.concat(0, 1, vec![head, tail]);
    assert_eq!(out.len(), 1);
    g.add_file_output("out.m4a", Vec::<String>::new(), &out);

    let fc = g.cmd().unwrap().filter_complex().unwrap();
    assert_eq!(
        fc,
        "[0:a]asplit[s0][s1];[s0]atrim=end=2[s2];[s1]atrim=start=2[s3];[s2][s3]concat=n=2:v=0:a=1[s4]"
    );
}

#[test]
fn unused_split_outputs_are_drained() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4"));
    let v = g.video(i);
    let a = g.audio(i);
    let (used, _unused) = g.split(v);
    let (_idle, kept) = g.split(a);
    g.add_file_output("out.mp4", Vec::<String>::new(), &[used, kept]);

    let cmd = g.cmd().unwrap();
    assert_eq!(
        cmd.filter_complex().unwrap(),
        "[0:v]split[s0][s1];[s1]nullsink;[0:a]asplit[s2][s3];[s2]anullsink"
    );
    let args = strs(&cmd);
    assert!(args.windows(2).any(|w| w == ["-map", "[s0]"]), "{args:?}");
    assert!(args.windows(2).any(|w| w == ["-map", "[s3]"]), "{args:?}");
}

#[test]
fn kind_mismatch_is_rejected() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4"));
    let v = g.video(i);
    let a = g.audio(i);
    let o = g.overlay(v, a, 0, 0);
    g.add_file_output("out.mp4", Vec::<String>::new(), &[o]);
    let err = g.cmd().unwrap_err();
    assert!(matches!(err, MediaError::Graph(_)), "{err}");
}

#[test]
fn forward_connected_to_other_kind_is_rejected() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4"));
    let v = g.video(i);
    let fwd = g.forward(StreamKind::Audio);
    assert!(g.connect(fwd, v));
    let out = g.filter(fwd, "volume=2");
    g.add_file_output("out.m4a", Vec::<String>::new(), &[out]);
    let err = g.cmd().unwrap_err();
    assert!(err.to_string().contains("used as both"), "{err}");
}

#[test]
fn cycles_fail_fast() {
    let mut g = Graph::new();
    let fwd = g.forward(StreamKind::Video);
    let a = g.filter(fwd, "hflip");
    let b = g.filter(a, "vflip");
    assert!(g.connect(fwd, b));
    g.add_file_output("out.mp4", Vec::<String>::new(), &[b]);
    let err = g.cmd().unwrap_err();
    assert!(err.to_string().contains("cycle"), "{err}");
}

#[test]
fn unconnected_forward_is_rejected() {
    let mut g = Graph::new();
    let fwd = g.forward(StreamKind::Video);
    let a = g.filter(fwd, "hflip");
    g.add_file_output("out.mp4", Vec::<String>::new(), &[a]);
    assert!(g.cmd().unwrap_err().to_string().contains("never connected"));
}

#[test]
fn foreign_handles_are_rejected() {
    let mut other = Graph::new();
    let oi = other.input(Input::path("x.mp4"));
    let foreign = other.video(oi);

    let mut g = Graph::new();
    g.add_file_output("out.mp4", Vec::<String>::new(), &[foreign]);
    assert!(
        g.cmd()
            .unwrap_err()
            .to_string()
            .contains("another graph")
    );
}

#[test]
fn empty_graph_has_no_command() {
    assert!(Graph::new().cmd().is_err());
}

#[test]
fn stdout_output_is_recorded() {
    let mut g = Graph::new();
    let i = g.input(Input::path("in.mp4"));
    let v = g.video(i);
    let first = g.filter(v, "select=eq(n\\,0)");
    g.add_output(Target::Stdout, ["-frames:v", "1", "-f", "mjpeg"], &[first]);
    let cmd = g.cmd().unwrap();
    assert!(cmd.captures_stdout());
    assert_eq!(cmd.args().last().unwrap(), "pipe:1");
}

#[test]
fn source_filters_start_their_own_chain() {
    let mut g = Graph::new();
    let silence = g.anullsrc();
    let silence = g.filter(silence, "atrim=duration=15");
    g.add_file_output("out.m4a", Vec::<String>::new(), &[silence]);
    assert_eq!(
        g.cmd().unwrap().filter_complex().unwrap(),
        "anullsrc,atrim=duration=15[s0]"
    );
}
