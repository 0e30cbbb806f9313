//! Context Compressor (spec §4.8): decide when to condense a transcript,
//! build a condensed replacement that preserves tool-call/tool-result
//! pairing, enforce a post-condense size target, and fall back to a
//! strictly more aggressive strategy when the standard pass isn't enough.
//! Direct generalization of `build_compaction_summary` /
//! `build_compaction_summary_with_llm` / `truncate_line` / `extract_tool_path`
//! in `codingbuddy-agent/src/tool_loop/compaction.rs` — the teacher's
//! compaction is single-tier; this spec's is three-tier (standard,
//! aggressive retry, fallback).

use std::collections::BTreeSet;

use governor_core::{
    LlmClient, MessageContent, Role, TranscriptMessage, CONDENSE_THRESHOLD_PCT,
    KEEP_TOOL_RESULTS, KEEP_TOOL_RESULTS_AGGRESSIVE, MAX_SUMMARY_ENHANCEMENT_ATTEMPTS,
    MAX_TOOL_RESULT_LENGTH, MAX_TOOL_RESULT_LENGTH_AGGRESSIVE, MAX_TOOL_USE_INPUT_LENGTH,
    MIN_MESSAGES_BETWEEN_SUMMARIES, MIN_SUMMARY_TOKENS, POST_CONDENSE_TARGET_UTILIZATION,
    TOKEN_BUFFER_PCT,
};

/// `usable = context_window * (1 - buffer_pct) - max_completion_tokens`.
#[must_use]
pub fn usable_context(context_window: u64, max_completion_tokens: u64) -> u64 {
    let scaled = (context_window as f64) * (1.0 - TOKEN_BUFFER_PCT);
    (scaled as u64).saturating_sub(max_completion_tokens)
}

/// Trigger condition (spec §4.8): condense when `(total + last) / usable >=
/// CONDENSE_THRESHOLD_PCT`.
#[must_use]
pub fn should_condense(total_tokens: u64, last_message_tokens: u64, usable: u64) -> bool {
    if usable == 0 {
        return true;
    }
    let ratio = (total_tokens + last_message_tokens) as f64 / usable as f64;
    ratio >= CONDENSE_THRESHOLD_PCT
}

/// Progress-assessment statistics embedded in the summary prompt when
/// available (spec §4.8; the StateMachine reference is a weak/read-only
/// port, spec §9).
#[derive(Debug, Clone, Default)]
pub struct ProgressStats {
    pub phase: String,
    pub tool_calls_total: u64,
    pub modification_count: u64,
    pub test_calls_count: u64,
    pub modified_files: Vec<String>,
}

fn find_tool_use_result_pairs(messages: &[TranscriptMessage]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i + 1 < messages.len() {
        let ids: Vec<&str> = messages[i].content.tool_uses().map(|(id, _, _)| id).collect();
        if !ids.is_empty() {
            let next = &messages[i + 1];
            let matches = next.content.tool_results().any(|(tid, _)| ids.contains(&tid));
            if matches {
                pairs.push((i, i + 1));
                i += 2;
                continue;
            }
        }
        i += 1;
    }
    pairs
}

/// Indices to keep verbatim: first message, last message, and the most
/// recent `keep_pairs` tool_use/tool_result steps (spec §4.8's message
/// partition). A `tool_result` without a matching `tool_use` by ID is never
/// kept — it is summarised along with everything else not in this set.
#[must_use]
pub fn partition_keep_set(messages: &[TranscriptMessage], keep_pairs: usize) -> BTreeSet<usize> {
    let mut keep = BTreeSet::new();
    if messages.is_empty() {
        return keep;
    }
    keep.insert(0);
    keep.insert(messages.len() - 1);
    let pairs = find_tool_use_result_pairs(messages);
    for (a, b) in pairs.into_iter().rev().take(keep_pairs) {
        keep.insert(a);
        keep.insert(b);
    }
    keep
}

/// Truncate with a prefix+marker+suffix strategy, the marker itself counted
/// toward `max_len` (spec §4.8 rebuild step).
#[must_use]
pub fn truncate_with_marker(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let marker = format!("\n...[truncated {} chars]...\n", s.chars().count().saturating_sub(max_len));
    let remaining = max_len.saturating_sub(marker.chars().count());
    let head_len = remaining / 2;
    let tail_len = remaining - head_len;
    let chars: Vec<char> = s.chars().collect();
    let head: String = chars.iter().take(head_len).collect();
    let tail: String = chars.iter().rev().take(tail_len).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{head}{marker}{tail}")
}

/// Truncate the path-bearing/diff-bearing fields of a kept `tool_use` input
/// (`diff`, `content`, `file_text`, `patch`) to [`MAX_TOOL_USE_INPUT_LENGTH`].
fn truncate_tool_use_input(input: &serde_json::Value, max_len: usize) -> serde_json::Value {
    let mut out = input.clone();
    let Some(obj) = out.as_object_mut() else {
        return out;
    };
    for key in ["diff", "content", "file_text", "patch"] {
        if let Some(serde_json::Value::String(s)) = obj.get(key) {
            let truncated = truncate_with_marker(s, max_len);
            obj.insert(key.to_string(), serde_json::Value::String(truncated));
        }
    }
    out
}

fn rebuild_message(msg: &TranscriptMessage, max_result_len: usize) -> TranscriptMessage {
    let content = match &msg.content {
        MessageContent::Text(_) => msg.content.clone(),
        MessageContent::Blocks(blocks) => {
            let rebuilt = blocks
                .iter()
                .map(|b| match b {
                    governor_core::ContentBlock::ToolUse { id, name, input } => governor_core::ContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: truncate_tool_use_input(input, MAX_TOOL_USE_INPUT_LENGTH),
                    },
                    governor_core::ContentBlock::ToolResult { tool_use_id, content } => {
                        governor_core::ContentBlock::ToolResult {
                            tool_use_id: tool_use_id.clone(),
                            content: truncate_with_marker(content, max_result_len),
                        }
                    }
                    governor_core::ContentBlock::Text { text } => governor_core::ContentBlock::Text { text: text.clone() },
                })
                .collect();
            MessageContent::Blocks(rebuilt)
        }
    };
    TranscriptMessage {
        role: msg.role,
        content,
        ts: msg.ts,
        is_summary: msg.is_summary,
        condense_id: msg.condense_id,
        condense_parent: msg.condense_parent,
    }
}

/// The eight mandated sections (spec §4.8): preserved order, always present
/// even when a section has nothing to report.
const SUMMARY_SECTIONS: &[&str] = &[
    "USER_CONTEXT",
    "CONSTRAINTS",
    "TASK_TRACKING",
    "CODE_STATE",
    "TESTS",
    "CHANGES",
    "ERRORS",
    "NEXT_STEPS",
];

/// Build the structured-format prompt sent to the LLM to produce the
/// condensation summary. Raw diffs are never included; test names and
/// commands are preserved verbatim by extracting them directly from the
/// dropped tool_use/tool_result blocks rather than asking the model to
/// reproduce them.
#[must_use]
pub fn build_summary_prompt(dropped: &[TranscriptMessage], stats: Option<&ProgressStats>) -> String {
    let mut test_commands = Vec::new();
    let mut file_paths = Vec::new();
    for msg in dropped {
        for (_, name, input) in msg.content.tool_uses() {
            if name == "execute_command"
                && let Some(cmd) = input.get("command").and_then(|v| v.as_str())
            {
                test_commands.push(cmd.to_string());
            }
            if let Some(p) = input.get("path").and_then(|v| v.as_str()) {
                file_paths.push(p.to_string());
            }
        }
    }
    test_commands.sort();
    test_commands.dedup();
    file_paths.sort();
    file_paths.dedup();

    let mut out = String::new();
    out.push_str("Summarise the conversation below into exactly these sections. Preserve test \
        names and commands verbatim. Never include raw diffs.\n\n");
    for section in SUMMARY_SECTIONS {
        out.push_str(&format!("## {section}\n"));
        if *section == "TESTS" && !test_commands.is_empty() {
            for cmd in &test_commands {
                out.push_str(&format!("- `{cmd}`\n"));
            }
        }
        if *section == "CHANGES" && !file_paths.is_empty() {
            for p in &file_paths {
                out.push_str(&format!("- {p}\n"));
            }
        }
        out.push('\n');
    }
    if let Some(s) = stats {
        out.push_str(&format!(
            "## PROGRESS ASSESSMENT\nphase: {}\ntool_calls_total: {}\nmodification_count: {}\n\
             test_calls_count: {}\nmodified_files: {}\n",
            s.phase,
            s.tool_calls_total,
            s.modification_count,
            s.test_calls_count,
            s.modified_files.join(", ")
        ));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondensationTier {
    Standard,
    Aggressive,
    Fallback,
}

/// The result of a successful condensation pass. `messages` is the
/// ready-to-send condensed transcript (summary spliced in, dropped
/// originals omitted). `condense_id`/`keep` identify exactly which messages
/// of the caller's *own* transcript were summarised, so the caller can tag
/// them in place with [`tag_dropped`] — which `condense` already does for
/// the `messages` slice it was given (spec §4.8's "tag … so the transcript
/// carrier can hide them without destroying them").
#[derive(Debug, Clone)]
pub struct CondensationOutcome {
    pub messages: Vec<TranscriptMessage>,
    pub tier: CondensationTier,
    pub condensed_tokens: u64,
    pub condense_id: uuid::Uuid,
    pub keep: BTreeSet<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondensationSkipReason {
    RecentSummaryExists,
    WouldNotShrink,
}

fn recent_summary_exists(messages: &[TranscriptMessage]) -> bool {
    let window_start = messages.len().saturating_sub(MIN_MESSAGES_BETWEEN_SUMMARIES);
    messages[window_start..].iter().any(|m| m.is_summary)
}

fn summary_message(summary_text: String, ts: i64, condense_id: uuid::Uuid) -> TranscriptMessage {
    TranscriptMessage {
        role: Role::Assistant,
        content: MessageContent::Text(summary_text),
        ts,
        is_summary: true,
        condense_id: Some(condense_id),
        condense_parent: None,
    }
}

/// Request a summary from the LLM, re-requesting up to
/// `MAX_SUMMARY_ENHANCEMENT_ATTEMPTS` times until it reaches
/// `MIN_SUMMARY_TOKENS`.
fn request_summary(client: &dyn LlmClient, prompt: &str, dropped: &[TranscriptMessage]) -> String {
    let mut best = String::new();
    let mut enhance = String::new();
    for _ in 0..=MAX_SUMMARY_ENHANCEMENT_ATTEMPTS {
        let full_prompt = format!("{prompt}{enhance}");
        let response = client.create_message(&full_prompt, dropped);
        if response.output_tokens >= MIN_SUMMARY_TOKENS {
            return response.text;
        }
        if response.text.len() > best.len() {
            best = response.text;
        }
        enhance = "\n\nThe previous summary was too short. Expand it with more detail in each \
            section while still following the same structure."
            .to_string();
    }
    best
}

/// Build the condensed (send-able) transcript for one tier, given a
/// pre-computed keep-set and the `condense_id` that will also be used to tag
/// the caller's own transcript afterward (`condense`'s job, not this one's —
/// this function never sees a `&mut` transcript to tag).
fn build_condensed(
    messages: &[TranscriptMessage],
    keep: &BTreeSet<usize>,
    max_result_len: usize,
    client: &dyn LlmClient,
    stats: Option<&ProgressStats>,
    condense_id: uuid::Uuid,
) -> Vec<TranscriptMessage> {
    let dropped: Vec<TranscriptMessage> = messages
        .iter()
        .enumerate()
        .filter(|(i, _)| !keep.contains(i))
        .map(|(_, m)| m.clone())
        .collect();

    let summary_text = if dropped.is_empty() {
        String::new()
    } else {
        let prompt = build_summary_prompt(&dropped, stats);
        request_summary(client, &prompt, &dropped)
    };

    let mut out = Vec::with_capacity(messages.len());
    for (i, msg) in messages.iter().enumerate() {
        if i == 0 {
            out.push(rebuild_message(msg, max_result_len));
            if !dropped.is_empty() {
                out.push(summary_message(summary_text.clone(), msg.ts, condense_id));
            }
            continue;
        }
        if keep.contains(&i) {
            out.push(rebuild_message(msg, max_result_len));
        }
        // dropped messages are omitted from this (send-able) copy; `condense`
        // tags the *originals* in the caller's own transcript via
        // `tag_dropped` instead of discarding them.
    }
    out
}

/// Tag every dropped original message with `condense_parent` so a transcript
/// carrier can hide (not destroy) them — idempotence for subsequent runs.
pub fn tag_dropped(messages: &mut [TranscriptMessage], keep: &BTreeSet<usize>, condense_id: uuid::Uuid) {
    for (i, msg) in messages.iter_mut().enumerate() {
        if !keep.contains(&i) && msg.condense_parent.is_none() {
            msg.condense_parent = Some(condense_id);
        }
    }
}

/// Run the full three-tier condensation pipeline (spec §4.8) and tag the
/// caller's own `messages` in place with the winning tier's `condense_id` so
/// the dropped originals are hidden, not destroyed (§4.8 idempotence: a later
/// call sees `condense_parent` already set and skips them via
/// [`recent_summary_exists`]-style guards upstream). Returns `Err(reason)` if
/// condensation should not occur at all (the guards); `messages` is left
/// untouched in that case.
pub fn condense(
    messages: &mut [TranscriptMessage],
    client: &dyn LlmClient,
    stats: Option<&ProgressStats>,
    usable: u64,
) -> Result<CondensationOutcome, CondensationSkipReason> {
    if recent_summary_exists(messages) {
        return Err(CondensationSkipReason::RecentSummaryExists);
    }

    let original_tokens = governor_core::estimate_tokens(messages);

    let standard_keep = partition_keep_set(messages, KEEP_TOOL_RESULTS);
    let standard_id = uuid::Uuid::now_v7();
    let standard = build_condensed(
        messages,
        &standard_keep,
        MAX_TOOL_RESULT_LENGTH,
        client,
        stats,
        standard_id,
    );
    let standard_tokens = governor_core::estimate_tokens(&standard);

    if standard_tokens >= original_tokens {
        return Err(CondensationSkipReason::WouldNotShrink);
    }

    let target = (usable as f64 * POST_CONDENSE_TARGET_UTILIZATION) as u64;
    if standard_tokens <= target {
        tag_dropped(messages, &standard_keep, standard_id);
        return Ok(CondensationOutcome {
            messages: standard,
            tier: CondensationTier::Standard,
            condensed_tokens: standard_tokens,
            condense_id: standard_id,
            keep: standard_keep,
        });
    }

    let aggressive_keep = partition_keep_set(messages, KEEP_TOOL_RESULTS_AGGRESSIVE);
    let aggressive_id = uuid::Uuid::now_v7();
    let aggressive = build_condensed(
        messages,
        &aggressive_keep,
        MAX_TOOL_RESULT_LENGTH_AGGRESSIVE,
        client,
        stats,
        aggressive_id,
    );
    let aggressive_tokens = governor_core::estimate_tokens(&aggressive);
    if aggressive_tokens <= usable {
        tag_dropped(messages, &aggressive_keep, aggressive_id);
        return Ok(CondensationOutcome {
            messages: aggressive,
            tier: CondensationTier::Aggressive,
            condensed_tokens: aggressive_tokens,
            condense_id: aggressive_id,
            keep: aggressive_keep,
        });
    }

    let fallback_id = uuid::Uuid::now_v7();
    let fallback_keep = fallback_keep_set(messages);
    let fallback = build_fallback(messages, fallback_id);
    let fallback_tokens = governor_core::estimate_tokens(&fallback);
    tag_dropped(messages, &fallback_keep, fallback_id);
    Ok(CondensationOutcome {
        messages: fallback,
        tier: CondensationTier::Fallback,
        condensed_tokens: fallback_tokens,
        condense_id: fallback_id,
        keep: fallback_keep,
    })
}

/// The fallback tier's keep-set: `{first, last two}`, matching [`build_fallback`].
fn fallback_keep_set(messages: &[TranscriptMessage]) -> BTreeSet<usize> {
    let mut keep = BTreeSet::new();
    if messages.is_empty() {
        return keep;
    }
    keep.insert(0);
    let len = messages.len();
    keep.insert(len.saturating_sub(1));
    if len >= 2 {
        keep.insert(len - 2);
    }
    keep
}

/// Retain only `{first_message, last_two_messages}`, truncate their
/// tool_results to 4000 chars, and insert a synthetic summary message
/// declaring that fallback was used (spec §4.8 guards). `condense_id` tags the
/// spliced summary so the caller can also tag the dropped originals with it.
#[must_use]
pub fn build_fallback(messages: &[TranscriptMessage], condense_id: uuid::Uuid) -> Vec<TranscriptMessage> {
    if messages.is_empty() {
        return Vec::new();
    }
    let first = rebuild_message(&messages[0], MAX_TOOL_RESULT_LENGTH_AGGRESSIVE);
    let last_two: Vec<TranscriptMessage> = messages
        .iter()
        .rev()
        .take(2)
        .map(|m| rebuild_message(m, MAX_TOOL_RESULT_LENGTH_AGGRESSIVE))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let mut out = vec![first];
    out.push(summary_message(
        "Context was too large to summarise normally; the transcript was cut to the first and \
         last two messages. Some history has been lost."
            .to_string(),
        messages[0].ts,
        condense_id,
    ));
    out.extend(last_two);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor_core::{ContentBlock, LlmResponse};

    struct StubLlm {
        response: String,
    }

    impl LlmClient for StubLlm {
        fn count_tokens(&self, blocks: &[ContentBlock]) -> u64 {
            blocks.iter().map(ContentBlock::char_len).sum::<usize>() as u64 / 4
        }

        fn create_message(&self, _system_prompt: &str, _messages: &[TranscriptMessage]) -> LlmResponse {
            LlmResponse {
                text: self.response.clone(),
                output_tokens: (self.response.len() / 4) as u64,
                total_cost: 0.0,
            }
        }
    }

    fn big_summary() -> String {
        "x".repeat((MIN_SUMMARY_TOKENS as usize + 500) * 4)
    }

    fn tool_step(id: &str, command: &str, output: &str, ts: i64) -> [TranscriptMessage; 2] {
        let assistant = TranscriptMessage {
            role: Role::Assistant,
            content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: "execute_command".to_string(),
                input: serde_json::json!({"command": command}),
            }]),
            ts,
            is_summary: false,
            condense_id: None,
            condense_parent: None,
        };
        let user = TranscriptMessage {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: id.to_string(),
                content: output.to_string(),
            }]),
            ts: ts + 1,
            is_summary: false,
            condense_id: None,
            condense_parent: None,
        };
        [assistant, user]
    }

    fn build_transcript(n_steps: usize) -> Vec<TranscriptMessage> {
        let mut out = vec![TranscriptMessage::text(Role::User, "fix the bug in foo.py", 0)];
        for i in 0..n_steps {
            let [a, u] = tool_step(&format!("id{i}"), &format!("pytest t{i}"), &format!("output {i}"), (i as i64) * 2 + 1);
            out.push(a);
            out.push(u);
        }
        out.push(TranscriptMessage::text(Role::User, "final message", 1000));
        out
    }

    #[test]
    fn usable_context_applies_buffer_and_completion_reserve() {
        assert_eq!(usable_context(100_000, 10_000), 80_000);
    }

    #[test]
    fn should_condense_triggers_at_threshold() {
        let usable = usable_context(100_000, 10_000);
        assert!(!should_condense(50_000, 1_000, usable));
        assert!(should_condense(60_000, 3_000, usable));
    }

    #[test]
    fn s5_partition_keeps_exact_set() {
        let transcript = build_transcript(8);
        let keep = partition_keep_set(&transcript, KEEP_TOOL_RESULTS);
        // task(0), last(17), and steps 5..8 paired -> indices 9..17
        assert!(keep.contains(&0));
        assert!(keep.contains(&transcript.len() - 1));
        for i in 9..17 {
            assert!(keep.contains(&i), "expected index {i} kept");
        }
        for i in 1..9 {
            assert!(!keep.contains(&i), "expected index {i} dropped");
        }
    }

    #[test]
    fn orphaned_tool_result_is_not_kept() {
        let mut transcript = build_transcript(1);
        // Break the pairing by renaming the tool_result's tool_use_id.
        if let MessageContent::Blocks(blocks) = &mut transcript[2].content {
            if let ContentBlock::ToolResult { tool_use_id, .. } = &mut blocks[0] {
                *tool_use_id = "orphan".to_string();
            }
        }
        let keep = partition_keep_set(&transcript, KEEP_TOOL_RESULTS);
        assert!(!keep.contains(&1));
        assert!(!keep.contains(&2));
    }

    #[test]
    fn truncate_with_marker_preserves_head_and_tail() {
        let s = "a".repeat(50) + &"b".repeat(50) + &"c".repeat(50);
        let t = truncate_with_marker(&s, 60);
        assert!(t.starts_with("aaaa"));
        assert!(t.ends_with("cccc"));
        assert!(t.contains("truncated"));
    }

    #[test]
    fn condensation_shrinks_and_keeps_ends() {
        let mut transcript = build_transcript(20);
        let original_tokens = governor_core::estimate_tokens(&transcript);
        let client = StubLlm { response: big_summary() };
        let result = condense(&mut transcript, &client, None, usable_context(1_000_000, 10_000)).unwrap();
        assert!(result.condensed_tokens < original_tokens);
        assert_eq!(result.messages.first().unwrap().ts, transcript.first().unwrap().ts);
        assert_eq!(result.messages.last().unwrap().ts, transcript.last().unwrap().ts);
    }

    #[test]
    fn dropped_originals_are_tagged_not_destroyed() {
        let mut transcript = build_transcript(20);
        let client = StubLlm { response: big_summary() };
        let result = condense(&mut transcript, &client, None, usable_context(1_000_000, 10_000)).unwrap();
        assert_eq!(transcript.len(), result.keep.len() + (transcript.len() - result.keep.len()));
        for (i, msg) in transcript.iter().enumerate() {
            if result.keep.contains(&i) {
                assert_eq!(msg.condense_parent, None, "kept message {i} should not be tagged");
            } else {
                assert_eq!(
                    msg.condense_parent,
                    Some(result.condense_id),
                    "dropped message {i} must carry condense_parent == condense_id"
                );
            }
        }
    }

    #[test]
    fn skips_when_recent_summary_exists() {
        let mut transcript = build_transcript(2);
        transcript.last_mut().unwrap().is_summary = true;
        let client = StubLlm { response: big_summary() };
        let err = condense(&mut transcript, &client, None, usable_context(1_000_000, 10_000)).unwrap_err();
        assert_eq!(err, CondensationSkipReason::RecentSummaryExists);
    }

    #[test]
    fn build_fallback_keeps_first_and_last_two() {
        let transcript = build_transcript(10);
        let fallback = build_fallback(&transcript, uuid::Uuid::now_v7());
        assert_eq!(fallback.len(), 4);
        assert!(fallback[1].is_summary);
    }

    #[test]
    fn summary_prompt_never_includes_raw_diff_field() {
        let dropped = vec![TranscriptMessage {
            role: Role::Assistant,
            content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                id: "1".to_string(),
                name: "apply_diff".to_string(),
                input: serde_json::json!({"diff": "--- a\n+++ b\n-old\n+new"}),
            }]),
            ts: 0,
            is_summary: false,
            condense_id: None,
            condense_parent: None,
        }];
        let prompt = build_summary_prompt(&dropped, None);
        assert!(!prompt.contains("--- a"));
    }
}
