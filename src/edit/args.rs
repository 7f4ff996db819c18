use crate::foundation::error::{MediaError, MediaResult};

/// Allowed range for `speed`.
pub const SPEED_RANGE: std::ops::RangeInclusive<f64> = 0.5..=100.0;

/// Hosts whose `t` query parameter is taken as the default music skip.
const TIMESTAMP_HOSTS: &[&str] = &["youtu.be", "youtube.com", "www.youtube.com", "m.youtube.com"];

/// Parsed edit directives.
///
/// Every field is optional; [`crate::edit::plan_edit`] applies whatever is set in a fixed
/// stage order regardless of the order the directives were written in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditArgs {
    pub speed: Option<f64>,
    pub volume: Option<f64>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub mute: bool,
    pub reverse: bool,
    pub areverse: bool,
    pub vreverse: bool,
    pub vibrato: bool,
    pub reverb: bool,
    pub muffle: bool,
    /// Music URL or search query, as written.
    pub music: Option<String>,
    /// Explicit `musicskip`.
    pub music_skip: Option<f64>,
    /// Skip offset taken from the music URL's `t` parameter.
    pub music_url_skip: Option<f64>,
    pub music_delay: Option<f64>,
    /// Loop length in seconds for still images.
    pub length: Option<u32>,
    /// Rotation in degrees per second.
    pub spin: Option<f64>,
    pub fade_in: Option<f64>,
    pub fade_in_start: Option<f64>,
    pub fade_out: Option<f64>,
    pub fade_out_start: Option<f64>,
    pub top_text: Option<String>,
    pub bottom_text: Option<String>,
    pub caption: Option<String>,
}

impl EditArgs {
    /// Offset into the music track. An explicit `musicskip` beats the URL timestamp.
    pub fn music_skip(&self) -> f64 {
        self.music_skip.or(self.music_url_skip).unwrap_or(0.0)
    }

    /// Whether meme text is requested.
    pub fn has_meme_text(&self) -> bool {
        self.top_text.is_some() || self.bottom_text.is_some()
    }
}

/// Parse a comma-separated directive list such as `"speed 2, reverse, cap hello"`.
///
/// Blank segments are ignored but at least one directive is required.
pub fn parse_edit_arguments(text: &str) -> MediaResult<EditArgs> {
    let mut args = EditArgs::default();
    let mut seen = 0usize;
    for segment in text.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        seen += 1;
        let (name, value) = match segment.split_once(char::is_whitespace) {
            Some((name, value)) => (name, Some(value.trim())),
            None => (segment, None),
        };
        apply_directive(&mut args, &name.to_ascii_lowercase(), value)?;
    }
    if seen == 0 {
        return Err(MediaError::parse("", "no directives given"));
    }
    Ok(args)
}

fn apply_directive(args: &mut EditArgs, name: &str, value: Option<&str>) -> MediaResult<()> {
    let need = || value.ok_or_else(|| MediaError::parse(name, "missing value"));
    match name {
        "speed" => {
            let speed = number(name, need()?)?;
            if !SPEED_RANGE.contains(&speed) {
                return Err(MediaError::parse(
                    name,
                    format!("speed must be between 0.5 and 100, got {speed}"),
                ));
            }
            args.speed = Some(speed);
        }
        "volume" => args.volume = Some(non_negative(name, need()?)?),
        "start" => args.start = Some(timestamp(name, need()?)?),
        "end" => args.end = Some(timestamp(name, need()?)?),
        "mute" => args.mute = true,
        "reverse" => args.reverse = true,
        "areverse" => args.areverse = true,
        "vreverse" => args.vreverse = true,
        "vibrato" => args.vibrato = true,
        "reverb" => args.reverb = true,
        "muffle" => args.muffle = true,
        "music" => {
            let music = need()?.trim_matches(|c| c == '<' || c == '>').trim();
            if music.is_empty() {
                return Err(MediaError::parse(name, "missing value"));
            }
            args.music_url_skip = url_timestamp(music);
            args.music = Some(music.to_string());
        }
        "musicskip" => args.music_skip = Some(timestamp(name, need()?)?),
        "musicdelay" => args.music_delay = Some(timestamp(name, need()?)?),
        "length" => {
            let raw = need()?;
            let length: u32 = raw
                .parse()
                .map_err(|_| MediaError::parse(name, format!("invalid whole number \"{raw}\"")))?;
            if length == 0 {
                return Err(MediaError::parse(name, "length must be at least 1 second"));
            }
            args.length = Some(length);
        }
        "spin" => args.spin = Some(number(name, need()?)?),
        "fadein" => args.fade_in = Some(non_negative(name, need()?)?),
        "fadeinstart" => args.fade_in_start = Some(timestamp(name, need()?)?),
        "fadeout" => args.fade_out = Some(non_negative(name, need()?)?),
        "fadeoutstart" => args.fade_out_start = Some(timestamp(name, need()?)?),
        "tt" => args.top_text = Some(need()?.to_string()),
        "bt" => args.bottom_text = Some(need()?.to_string()),
        "cap" | "caption" => args.caption = Some(need()?.to_string()),
        _ => return Err(MediaError::parse(name, "unknown directive")),
    }
    Ok(())
}

fn number(name: &str, raw: &str) -> MediaResult<f64> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(MediaError::parse(name, format!("invalid number \"{raw}\""))),
    }
}

fn non_negative(name: &str, raw: &str) -> MediaResult<f64> {
    let v = number(name, raw)?;
    if v < 0.0 {
        return Err(MediaError::parse(name, format!("must not be negative, got {v}")));
    }
    Ok(v)
}

fn timestamp(name: &str, raw: &str) -> MediaResult<f64> {
    parse_timestamp(raw)
        .ok_or_else(|| MediaError::parse(name, format!("invalid timestamp \"{raw}\"")))
}

/// Parse `SS[.frac]` or `MM:SS[.frac]` into seconds.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let secs_of = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    match raw.split_once(':') {
        Some((min, sec)) => {
            let min: u32 = min.parse().ok()?;
            Some(f64::from(min) * 60.0 + secs_of(sec)?)
        }
        None => secs_of(raw),
    }
}

/// The `t` parameter of a video-host URL, e.g. `https://youtu.be/abc?t=90`.
fn url_timestamp(music: &str) -> Option<f64> {
    let parsed = url::Url::parse(music).ok()?;
    let host = parsed.host_str()?;
    if !TIMESTAMP_HOSTS.contains(&host) {
        return None;
    }
    let (_, t) = parsed.query_pairs().find(|(k, _)| k == "t")?;
    let secs: u32 = t.strip_suffix('s').unwrap_or(t.as_ref()).parse().ok()?;
    Some(f64::from(secs))
}

/// Turns a `music` directive into something the tool can open.
pub trait MusicResolver: Send + Sync {
    /// Resolve a URL or search query into a URL or path.
    fn resolve(&self, query: &str) -> MediaResult<String>;
}

/// Uses the directive text as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughResolver;

impl MusicResolver for PassthroughResolver {
    fn resolve(&self, query: &str) -> MediaResult<String> {
        Ok(query.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/edit/args.rs"]
mod tests;
