//! Markup generation for exercise previews.
//!
//! Output is deterministic for a given draft and resolved data file. Anchors are
//! derived from the exercise name with `anchor_id`. Code parts are joined with
//! the sentinel delimiters only here, at the serialization boundary.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{
  ActiveCodeBody, AssignmentExercise, Choice, CodeParts, DataFileRecord, ExerciseDraft, ExercisePayload,
  ExerciseType, MultipleChoiceBody,
};
use crate::util::escape_attr;

/// Separates hidden prefix code from starter code.
pub const PREFIX_DELIMITER: &str = "^^^^";
/// Separates starter code from hidden suffix code.
pub const SUFFIX_DELIMITER: &str = "====";

pub const IMAGE_TYPES: &[&str] = &["png", "jpg", "jpeg"];
pub const DEFAULT_ROWS: u32 = 10;
pub const DEFAULT_COLS: u32 = 40;
const DEFAULT_LANGUAGE: &str = "python";

/// Markup-safe anchor: every non-alphanumeric char becomes `_`, then lowercase.
pub fn anchor_id(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
    .collect()
}

pub fn is_image_type(file_type: &str) -> bool {
  let t = file_type.to_lowercase();
  IMAGE_TYPES.iter().any(|i| *i == t)
}

/// Join code parts with the sentinel delimiters.
pub fn join_code_parts(code: &CodeParts) -> String {
  format!(
    "{}\n{}\n{}\n{}\n{}",
    code.prefix, PREFIX_DELIMITER, code.starter, SUFFIX_DELIMITER, code.suffix
  )
}

/// Inverse of `join_code_parts`. A blob without a prefix delimiter is all starter code.
pub fn split_code_parts(blob: &str) -> CodeParts {
  let pre = format!("\n{PREFIX_DELIMITER}\n");
  let suf = format!("\n{SUFFIX_DELIMITER}\n");

  let (prefix, rest) = match blob.split_once(&pre) {
    Some((p, r)) => (p.to_string(), r),
    None => (String::new(), blob),
  };
  let (starter, suffix) = match rest.split_once(&suf) {
    Some((s, x)) => (s.to_string(), x.to_string()),
    None => (rest.to_string(), String::new()),
  };
  CodeParts { prefix, starter, suffix }
}

/// Text inside the first code-editor textarea of a generated fragment.
pub fn editor_source(markup: &str) -> Option<&str> {
  let start = markup.find("_editor\" data-timelimit=")?;
  let open_end = start + markup[start..].find('>')? + 1;
  let close = open_end + markup[open_end..].find("</textarea>")?;
  let inner = &markup[open_end..close];
  let inner = inner.strip_prefix('\n').unwrap_or(inner);
  Some(inner.strip_suffix('\n').unwrap_or(inner))
}

/// Render the whole draft. `datafile` is the record the draft's reference
/// resolved to, if any; an unresolved reference yields no data-file fragment.
pub fn generate_preview(draft: &ExerciseDraft, datafile: Option<&DataFileRecord>) -> String {
  match &draft.payload {
    ExercisePayload::ActiveCode(body) => active_code_preview(&draft.name, body, datafile),
    ExercisePayload::MultipleChoice(body) => multiple_choice_preview(&draft.name, body),
  }
}

fn active_code_preview(name: &str, body: &ActiveCodeBody, datafile: Option<&DataFileRecord>) -> String {
  let safe_id = anchor_id(name);
  let language = if body.language.is_empty() { DEFAULT_LANGUAGE } else { body.language.as_str() };
  // Only a reference that is both set and resolved produces data-file markup.
  let resolved = match (&body.datafile, datafile) {
    (Some(r), Some(df)) if !r.is_empty() && df.name == *r => Some(df),
    _ => None,
  };
  let datafile_attr = resolved
    .map(|df| format!("data-datafile='{}'", escape_attr(&df.filename)))
    .unwrap_or_default();
  let datafile_html = resolved.map(embedded_datafile).unwrap_or_default();

  format!(
    r#"
<div class="runestone explainer ac_section ">
<div data-component="activecode" id="{id}" data-question_label="{label}">
<div id="{id}_question" class="ac_question">
<p>{instructions}</p>

</div>
<textarea data-lang="{lang}" id="{id}_editor" data-timelimit=25000 data-codelens="true" data-audio='' data-wasm=/_static {dfattr} style="visibility: hidden;">
{code}
</textarea>
</div>
</div>
{dfhtml}
"#,
    id = safe_id,
    label = escape_attr(name),
    instructions = body.instructions,
    lang = escape_attr(language),
    dfattr = datafile_attr,
    code = join_code_parts(&body.code),
    dfhtml = datafile_html,
  )
}

fn geometry(df: &DataFileRecord) -> (u32, u32) {
  let rows = if df.rows == 0 { DEFAULT_ROWS } else { df.rows };
  let cols = if df.cols == 0 { DEFAULT_COLS } else { df.cols };
  (rows, cols)
}

fn embedded_datafile(df: &DataFileRecord) -> String {
  let filename = escape_attr(&df.filename);
  if is_image_type(&df.file_type) {
    return format!(
      r#"
<div class="runestone datafile">
<img data-component="datafile" data-isimage="true" id="{f}" data-filename="{f}" src="data:image/{t};base64,{c}"/>
</div>"#,
      f = filename,
      t = df.file_type.to_lowercase(),
      c = df.file_content,
    );
  }
  format!("\n{}", text_datafile(df, &filename))
}

fn text_datafile(df: &DataFileRecord, element_id: &str) -> String {
  let filename = escape_attr(&df.filename);
  let caption = format!(
    r#"<div class="datafile_caption"><code class="code-inline tex2jax_ignore">Data: {filename}</code></div>"#
  );
  if df.is_editable {
    let (rows, cols) = geometry(df);
    format!(
      r#"<div class="runestone datafile">
{caption}
<textarea id="{element_id}" rows="{rows}" cols="{cols}" class="datafiletextfield runestone-component-ready" data-filename="{filename}">{content}</textarea>
</div>"#,
      content = df.file_content,
    )
  } else {
    format!(
      r#"<div class="runestone datafile">
{caption}
<pre id="{element_id}" data-component="datafile" data-filename="{filename}">{content}</pre>
</div>"#,
      content = df.file_content,
    )
  }
}

/// Standalone preview of a data file, anchored on `question_name`.
pub fn datafile_preview(df: &DataFileRecord, question_name: &str) -> String {
  let anchor = escape_attr(question_name);
  if is_image_type(&df.file_type) {
    let filename = escape_attr(&df.filename);
    return format!(
      r#"<div class="runestone datafile">
<div class="datafile_caption"><code class="code-inline tex2jax_ignore">Data: {filename}</code></div>
<img data-component="datafile" data-isimage="true" id="{anchor}" data-filename="{filename}" src="data:image/{t};base64,{c}"/>
</div>"#,
      t = df.file_type.to_lowercase(),
      c = df.file_content,
    );
  }
  text_datafile(df, &anchor)
}

fn multiple_choice_preview(name: &str, body: &MultipleChoiceBody) -> String {
  let safe_id = anchor_id(name);
  let multiple = body.choices.iter().filter(|c| c.correct).count() > 1;
  let mut items = String::new();
  for (i, choice) in body.choices.iter().enumerate() {
    let letter = option_letter(i);
    let correct = if choice.correct { r#" data-correct="yes""# } else { "" };
    items.push_str(&format!(
      "<li data-component=\"answer\" id=\"{safe_id}_opt_{letter}\"{correct}>{}</li>\n\
       <li data-component=\"feedback\" id=\"{safe_id}_opt_{letter}_fb\">{}</li>\n",
      choice.text, choice.feedback,
    ));
  }
  let multiple_attr = if multiple { r#" data-multipleanswers="true""# } else { "" };
  format!(
    r#"
<div class="runestone">
<ul data-component="multiplechoice" data-question_label="{label}"{multiple_attr} id="{safe_id}">
<p>{statement}</p>
{items}</ul>
</div>
"#,
    label = escape_attr(name),
    statement = body.statement,
  )
}

fn option_letter(i: usize) -> char {
  // MAX_CHOICES keeps this within a..j
  (b'a' + (i % 26) as u8) as char
}

fn between<'a>(s: &'a str, open: &str, close: &str) -> Option<&'a str> {
  let start = s.find(open)? + open.len();
  let end = start + s[start..].find(close)?;
  Some(&s[start..end])
}

fn choice_pattern() -> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r#"(?s)<li data-component="answer" id="[^"]*"( data-correct="yes")?>(.*?)</li>\s*<li data-component="feedback" id="[^"]*">(.*?)</li>"#,
    )
    .ok()
  })
  .as_ref()
}

/// Rebuild an editable draft from a stored exercise and its generated markup.
/// `known` maps a `data-datafile` filename back to the data-file name.
pub fn hydrate_draft(ex: &AssignmentExercise, known: &[DataFileRecord]) -> ExerciseDraft {
  let markup = ex.htmlsrc.as_str();
  let kind = if markup.contains(r#"data-component="multiplechoice""#) {
    ExerciseType::MultipleChoice
  } else {
    ExerciseType::ActiveCode
  };
  let mut draft = ExerciseDraft::new(kind);
  draft.name = ex.name.clone();
  draft.chapter = ex.chapter.clone();
  draft.subchapter = ex.subchapter.clone();
  draft.points = ex.points;
  draft.htmlsrc = ex.htmlsrc.clone();

  draft.payload = match kind {
    ExerciseType::ActiveCode => {
      let filename = between(markup, "data-datafile='", "'");
      ExercisePayload::ActiveCode(ActiveCodeBody {
        instructions: between(markup, "class=\"ac_question\">\n<p>", "</p>").unwrap_or_default().to_string(),
        language: between(markup, "data-lang=\"", "\"").unwrap_or(DEFAULT_LANGUAGE).to_string(),
        code: editor_source(markup).map(split_code_parts).unwrap_or_default(),
        datafile: filename.and_then(|f| known.iter().find(|df| df.filename == f)).map(|df| df.name.clone()),
      })
    }
    ExerciseType::MultipleChoice => {
      let choices: Vec<Choice> = choice_pattern()
        .map(|re| {
          re.captures_iter(markup)
            .map(|c| Choice {
              correct: c.get(1).is_some(),
              text: c.get(2).map_or("", |m| m.as_str()).to_string(),
              feedback: c.get(3).map_or("", |m| m.as_str()).to_string(),
            })
            .collect()
        })
        .unwrap_or_default();
      ExercisePayload::MultipleChoice(MultipleChoiceBody {
        statement: between(markup, "\n<p>", "</p>\n").unwrap_or_default().to_string(),
        choices,
      })
    }
  };
  draft
}
