use chrono::Utc;
use uuid::Uuid;

use gf_domain::error::Result;
use gf_domain::step::Step;

const AUTOGENERATED_MARKER: &str = "<!-- STEPS:AUTOGENERATED -->";
const INTRO_LABEL: &str = "intro_auto";
const OUTRO_LABEL: &str = "outro_auto";

fn yaml_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Block-scalar render of a (possibly multi-line) `note` field, indented
/// to align under `note: |` (spec.md 4.7). `serde_yaml`'s own scalar
/// style selection does not produce this exact shape, so it is
/// hand-written here.
fn render_note_block(note: &str) -> String {
    let mut out = String::from("note: |\n");
    for line in note.lines() {
        out.push_str(&format!("  {line}\n"));
    }
    out
}

fn step_yaml_line(step: &Step) -> String {
    match step {
        Step::Goto { url } => format!("  - type: goto\n    url: {}\n", yaml_quote(url)),
        Step::Click { label } => format!("  - type: click\n    label: {}\n", yaml_quote(label)),
        Step::Type { label, value, sensitive } => {
            let value_rendered = if *sensitive {
                yaml_quote("[HIDDEN]")
            } else {
                yaml_quote(value.as_deref().unwrap_or(""))
            };
            format!(
                "  - type: type\n    label: {}\n    value: {}\n    sensitive: {}\n",
                yaml_quote(label),
                value_rendered,
                sensitive
            )
        }
        Step::AssertPage { url } => format!("  - type: assert_page\n    url: {}\n", yaml_quote(url)),
        Step::Keypress { key } => format!("  - type: keypress\n    key: {}\n", yaml_quote(key)),
        Step::TtsStart { label, text } => {
            format!("  - type: tts_start\n    label: {}\n    text: {}\n", yaml_quote(label), yaml_quote(text))
        }
        Step::TtsWait { label } => format!("  - type: tts_wait\n    label: {}\n", yaml_quote(label)),
    }
}

/// Ensure a leading Goto (spec.md 4.7: "if the first executable step
/// is not a Goto, prepend one to baseUrl").
fn with_leading_goto(steps: Vec<Step>, base_url: &str) -> Vec<Step> {
    let needs_goto = steps
        .iter()
        .find(|s| !s.is_tts_marker())
        .map(|s| !matches!(s, Step::Goto { .. }))
        .unwrap_or(true);
    if needs_goto {
        let mut with_goto = Vec::with_capacity(steps.len() + 1);
        with_goto.push(Step::Goto { url: base_url.to_string() });
        with_goto.extend(steps);
        with_goto
    } else {
        steps
    }
}

/// Insert a missing `tts_wait(label)` immediately after the next
/// non-TTS step following an unpaired `tts_start(label)` (spec.md 4.7).
fn close_unpaired_tts(steps: Vec<Step>) -> Vec<Step> {
    use std::collections::HashSet;
    let mut open: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(steps.len());

    for step in steps {
        match &step {
            Step::TtsStart { label, .. } => {
                open.insert(label.clone());
                out.push(step);
            }
            Step::TtsWait { label } => {
                open.remove(label);
                out.push(step);
            }
            _ => {
                out.push(step.clone());
                if !open.is_empty() {
                    for label in open.drain().collect::<Vec<_>>() {
                        out.push(Step::TtsWait { label });
                    }
                }
            }
        }
    }
    // Any still-open pair at the very end (e.g. outro) is closed by the
    // caller, which always appends its own matching wait.
    for label in open {
        out.push(Step::TtsWait { label });
    }
    out
}

/// Inject `intro_auto` right after the first Goto and `outro_auto` at
/// the very end (spec.md 4.7), suppressing narration whose very next
/// actionable step is the initial navigation.
fn inject_auto_narration(steps: Vec<Step>) -> Vec<Step> {
    let mut out = Vec::with_capacity(steps.len() + 4);
    let mut inserted_intro = false;
    for step in steps {
        let is_first_goto = !inserted_intro && matches!(step, Step::Goto { .. });
        out.push(step);
        if is_first_goto {
            out.push(Step::TtsStart { label: INTRO_LABEL.into(), text: "Let's get started.".into() });
            out.push(Step::TtsWait { label: INTRO_LABEL.into() });
            inserted_intro = true;
        }
    }
    out.push(Step::TtsStart { label: OUTRO_LABEL.into(), text: "That's it, you're done.".into() });
    out.push(Step::TtsWait { label: OUTRO_LABEL.into() });
    out
}

pub struct MarkdownGuide {
    pub markdown: String,
    pub steps: Vec<Step>,
}

/// Renders the executed step list into markdown with YAML frontmatter
/// (spec.md 4.7). Reads the step list only at terminal transition.
pub struct MarkdownEmitter;

impl MarkdownEmitter {
    pub fn render(
        title: &str,
        base_url: &str,
        language: &str,
        output_dir: &str,
        record_video: bool,
        raw_steps: Vec<Step>,
        overview: &str,
        note: Option<&str>,
    ) -> Result<MarkdownGuide> {
        let steps = close_unpaired_tts(with_leading_goto(raw_steps, base_url));
        let steps = if steps.iter().any(|s| s.is_tts_marker()) {
            inject_auto_narration(steps)
        } else {
            steps
        };

        let mut frontmatter = String::new();
        frontmatter.push_str("---\n");
        frontmatter.push_str(&format!("title: {}\n", yaml_quote(title)));
        frontmatter.push_str(&format!("baseUrl: {}\n", yaml_quote(base_url)));
        frontmatter.push_str(&format!("generated: {}\n", Utc::now().to_rfc3339()));
        frontmatter.push_str(&format!("totalSteps: {}\n", steps.len()));
        frontmatter.push_str(&format!("recordVideo: {record_video}\n"));
        frontmatter.push_str("steps:\n");
        for step in &steps {
            frontmatter.push_str(&step_yaml_line(step));
        }
        frontmatter.push_str(&format!("language: {}\n", yaml_quote(language)));
        frontmatter.push_str(&format!("outputDir: {}\n", yaml_quote(output_dir)));
        if let Some(note) = note {
            frontmatter.push_str(&render_note_block(note));
        }
        frontmatter.push_str("---\n\n");

        let mut body = String::new();
        body.push_str("# Overview\n\n");
        body.push_str(overview);
        body.push_str("\n\n");
        body.push_str(AUTOGENERATED_MARKER);
        body.push('\n');

        Ok(MarkdownGuide {
            markdown: format!("{frontmatter}{body}"),
            steps,
        })
    }
}

pub fn new_script_id() -> Uuid {
    Uuid::new_v4()
}
