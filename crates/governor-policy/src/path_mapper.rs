//! Path Mapper (spec §4.1): pure rewriting of paths across the
//! `source_prefix` / `target_prefix` boundary, including the `<path>…</path>`
//! segments embedded in an opaque `args` XML-like string.
//!
//! Kept as small, fully pure, property-tested functions — the teacher's
//! convention for path/string utilities (see `shell_parse.rs`'s test style).

use std::sync::LazyLock;

/// Collapse `.`, `..`, and duplicate separators in a POSIX path, without
/// touching the filesystem.
fn normalize_posix(path: &str) -> String {
    let is_absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|s| *s != "..") {
                    stack.pop();
                } else if !is_absolute {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }
    let joined = stack.join("/");
    if is_absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Rewrite `p` from `source_prefix` to `target_prefix` if it equals the
/// prefix or begins with `prefix + "/"` after normalisation. Paths matching
/// neither prefix pass through unchanged.
#[must_use]
pub fn map_source_to_target(p: &str, source_prefix: &str, target_prefix: &str) -> String {
    rewrite_prefix(p, source_prefix, target_prefix)
}

/// The exact inverse of [`map_source_to_target`].
#[must_use]
pub fn map_target_to_source(p: &str, source_prefix: &str, target_prefix: &str) -> String {
    rewrite_prefix(p, target_prefix, source_prefix)
}

fn rewrite_prefix(p: &str, from_prefix: &str, to_prefix: &str) -> String {
    let normalized = normalize_posix(p);
    let from_norm = normalize_posix(from_prefix);
    if normalized == from_norm {
        return to_prefix.to_string();
    }
    if let Some(rest) = normalized.strip_prefix(&format!("{from_norm}/")) {
        return format!("{}/{}", to_prefix.trim_end_matches('/'), rest);
    }
    p.to_string()
}

static XML_PATH_TAG: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?s)<path>(.*?)</path>").unwrap());

/// Rewrite every `<path>…</path>` segment inside an opaque XML-like `args`
/// string using the same source→target rule. No other XML parsing is
/// performed — the enclosing system owns the rest of the syntax.
#[must_use]
pub fn map_args_xml(args: &str, source_prefix: &str, target_prefix: &str) -> String {
    XML_PATH_TAG
        .replace_all(args, |caps: &regex::Captures| {
            let inner = &caps[1];
            let mapped = map_source_to_target(inner, source_prefix, target_prefix);
            format!("<path>{mapped}</path>")
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "/testbed";
    const DST: &str = "/workspace/repo";

    #[test]
    fn rewrites_exact_prefix() {
        assert_eq!(map_source_to_target("/testbed", SRC, DST), "/workspace/repo");
    }

    #[test]
    fn rewrites_nested_path() {
        assert_eq!(
            map_source_to_target("/testbed/django/urls/resolvers.py", SRC, DST),
            "/workspace/repo/django/urls/resolvers.py"
        );
    }

    #[test]
    fn passes_through_unrelated_path() {
        assert_eq!(map_source_to_target("/home/u/f.py", SRC, DST), "/home/u/f.py");
    }

    #[test]
    fn does_not_rewrite_lookalike_prefix() {
        // "/testbedding" is not "/testbed" + "/" — must not be rewritten.
        assert_eq!(
            map_source_to_target("/testbedding/x.py", SRC, DST),
            "/testbedding/x.py"
        );
    }

    #[test]
    fn normalizes_before_matching() {
        assert_eq!(
            map_source_to_target("/testbed/./a/../b.py", SRC, DST),
            "/workspace/repo/b.py"
        );
    }

    #[test]
    fn inverse_round_trips() {
        let mapped = map_source_to_target("/testbed/a/b.py", SRC, DST);
        assert_eq!(map_target_to_source(&mapped, SRC, DST), "/testbed/a/b.py");
    }

    #[test]
    fn rewrites_path_inside_args_xml() {
        let args = "<file><path>/testbed/a.py</path><content>x</content></file>";
        let out = map_args_xml(args, SRC, DST);
        assert_eq!(
            out,
            "<file><path>/workspace/repo/a.py</path><content>x</content></file>"
        );
    }

    #[test]
    fn args_xml_unrelated_path_untouched() {
        let args = "<path>/etc/passwd</path>";
        assert_eq!(map_args_xml(args, SRC, DST), args);
    }

    proptest::proptest! {
        #[test]
        fn prop_idempotent(rest in "[a-zA-Z0-9_/]{0,40}") {
            let p = format!("/testbed/{rest}");
            let once = map_source_to_target(&p, SRC, DST);
            let twice = map_source_to_target(&once, SRC, DST);
            // P4: mapping an already-mapped (target-side) path is a no-op
            // because it no longer begins with source_prefix.
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_inverse(rest in "[a-zA-Z0-9_/]{0,40}") {
            let p = format!("/testbed/{rest}");
            let mapped = map_source_to_target(&p, SRC, DST);
            let back = map_target_to_source(&mapped, SRC, DST);
            prop_assert_eq!(normalize_posix(&back), normalize_posix(&p));
        }
    }
}
