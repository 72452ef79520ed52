//! Small utility helpers used across modules.

/// Escape a value for use inside a double- or single-quoted HTML attribute.
pub fn escape_attr(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      _ => out.push(ch),
    }
  }
  out
}

/// Lowercased text after the last '.', or "" when there is none.
pub fn file_suffix(filename: &str) -> String {
  match filename.rsplit_once('.') {
    Some((_, ext)) => ext.to_lowercase(),
    None => String::new(),
  }
}

/// Everything after the last '/'.
pub fn basename(path: &str) -> &str {
  match path.rfind('/') {
    Some(i) => &path[i + 1..],
    None => path,
  }
}

/// Add `new` to a comma-separated tag list, dropping `old` first.
pub fn replace_tag(tags: &str, new: &str, old: Option<&str>) -> String {
  let mut out: Vec<&str> = tags
    .split(',')
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .filter(|t| old.map_or(true, |o| !t.eq_ignore_ascii_case(o)))
    .collect();
  let new = new.trim();
  if !new.is_empty() && !out.iter().any(|t| t.eq_ignore_ascii_case(new)) {
    out.push(new);
  }
  out.join(",")
}
