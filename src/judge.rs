//! Grounded grading and answer generation.
//!
//! A grading call covers one batch of items that cite the same source. The
//! prompt carries the rubric, the (truncated) source text or a note that it
//! could not be found, and the items numbered from 1. The reply is parsed
//! line by line; every line that names an item index becomes that item's
//! grade, and items the judge skipped get an error grade. The result always
//! has exactly one grade per input item, in input order.

use anyhow::Result;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::config::{GenerationConfig, GradingConfig};
use crate::llm::{CompletionClient, CompletionRequest};
use crate::models::{Grade, ResponseItem};

const GRADER_SYSTEM_PROMPT: &str = "You are a strict but fair academic grader. Follow the rubric precisely and verify citations against the actual source material.";

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions using ONLY the provided context passages. If the passages do not contain the answer, say that they do not. Mention which passage supports each claim.";

/// Justification given to blank answers, which are never sent to the judge.
pub const ANSWER_MISSING: &str = "0: answer missing";

/// The source a batch is graded against.
#[derive(Debug, Clone, Copy)]
pub struct Grounding<'a> {
    /// Catalog path the batch cites, if any.
    pub target: Option<&'a str>,
    /// Loaded source text; `None` when the file is missing or nothing was cited.
    pub content: Option<&'a str>,
}

/// One retrieved passage handed to [`GroundedJudge::generate_answer`].
#[derive(Debug, Clone)]
pub struct ContextPassage {
    pub title: String,
    pub section: String,
    pub score: f32,
    pub text: String,
}

pub struct GroundedJudge<'a> {
    client: &'a dyn CompletionClient,
    grading: &'a GradingConfig,
    generation: &'a GenerationConfig,
}

impl<'a> GroundedJudge<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        grading: &'a GradingConfig,
        generation: &'a GenerationConfig,
    ) -> Self {
        Self {
            client,
            grading,
            generation,
        }
    }

    /// Grade one batch. Never fails: collaborator errors become error grades.
    pub async fn grade_batch(&self, grounding: Grounding<'_>, items: &[&ResponseItem]) -> Vec<Grade> {
        let mut grades: Vec<Option<Grade>> = items
            .iter()
            .map(|item| {
                (!item.has_answer()).then(|| Grade::Scored {
                    score: 0,
                    justification: ANSWER_MISSING.to_string(),
                })
            })
            .collect();

        let answered: Vec<usize> = (0..items.len()).filter(|&i| grades[i].is_none()).collect();
        if answered.is_empty() {
            return grades.into_iter().flatten().collect();
        }

        let to_grade: Vec<&ResponseItem> = answered.iter().map(|&i| items[i]).collect();
        let request = CompletionRequest {
            system: GRADER_SYSTEM_PROMPT.to_string(),
            user: build_grading_prompt(self.grading, grounding, &to_grade),
            temperature: self.grading.temperature,
            max_tokens: self.grading.max_tokens,
        };

        let judged = match self.client.complete(&request).await {
            Ok(reply) => {
                tracing::debug!(reply = %reply, "judge reply");
                align_grades(parse_judge_reply(&reply, self.grading.max_score), to_grade.len())
            }
            Err(e) => {
                tracing::warn!(error = %e, target = grounding.target.unwrap_or("-"), "grading batch failed");
                vec![Grade::error(format!("Grading failed: {}", e)); to_grade.len()]
            }
        };

        for (slot, grade) in answered.into_iter().zip(judged) {
            grades[slot] = Some(grade);
        }
        grades
            .into_iter()
            .map(|g| g.unwrap_or_else(|| Grade::error("no grade returned for this response")))
            .collect()
    }

    /// Answer `question` from the supplied passages only.
    pub async fn generate_answer(
        &self,
        question: &str,
        passages: &[ContextPassage],
        context_chars: usize,
    ) -> Result<String> {
        let request = CompletionRequest {
            system: ANSWER_SYSTEM_PROMPT.to_string(),
            user: build_answer_prompt(question, passages, context_chars),
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
        };
        Ok(self.client.complete(&request).await?)
    }
}

pub fn build_grading_prompt(
    grading: &GradingConfig,
    grounding: Grounding<'_>,
    items: &[&ResponseItem],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(grading.rubric.trim());
    prompt.push_str("\n\n");

    match (grounding.target, grounding.content) {
        (Some(target), Some(content)) => {
            let _ = write!(
                prompt,
                "CITATION SOURCE CONTENT:\nFile: {}\n---\n{}\n---\n",
                target,
                truncate_chars(content, grading.grounding_chars)
            );
        }
        (Some(target), None) => {
            let _ = writeln!(
                prompt,
                "CITATION SOURCE: {} (FILE NOT FOUND - responses citing it have incorrect citations)",
                target
            );
        }
        (None, _) => {
            prompt.push_str(
                "CITATION SOURCE: none (no matching source was found - treat these citations as incorrect)\n",
            );
        }
    }

    prompt.push_str(
        "\nGrade each of the following responses. For EACH response, verify that the citation \
is from the linked work and mostly lines up with the cited content. A response without a \
usable citation is graded as an incorrect citation. A response of only 1-2 sentences gets \
at most 4 points. Apply the AI usage deduction from each response's AI Usage Statement \
after the base score.\n",
    );

    for (idx, item) in items.iter().enumerate() {
        let _ = write!(
            prompt,
            "\nRESPONSE #{}:\nStudent: {}\nQuestion {}: {}\nRisk/Mitigation {}: {}\nAI Usage Statement: {}\n---\n",
            idx + 1,
            item.student,
            item.question,
            item.question_prompt,
            item.risk,
            item.response_text,
            item.ai_usage
        );
    }

    let _ = write!(
        prompt,
        "\nReturn your grades in this EXACT format, one line per response:\n\
RESPONSE #1: [points 0-{max}]|[5-7 word justification with the base score and one reason: \
5: full points; 4: only 1-2 sentences; 3: citation isn't specific; 2: inappropriate answer \
or irrelevant citation; 0: answer missing; add \"AI -1\" or \"AI -2\" when deducted]\n\
RESPONSE #2: [points]|[justification]\n...\n\n\
Be strict but fair. Do not use dashes in justifications.",
        max = grading.max_score
    );

    prompt
}

fn build_answer_prompt(question: &str, passages: &[ContextPassage], context_chars: usize) -> String {
    let mut prompt = String::from("Context passages:\n");
    for (i, p) in passages.iter().enumerate() {
        let _ = write!(
            prompt,
            "\n[{}] {} / {} (similarity {:.3})\n{}\n",
            i + 1,
            p.title,
            p.section,
            p.score,
            truncate_chars(&p.text, context_chars)
        );
    }
    let _ = write!(prompt, "\nQuestion: {}\n", question);
    prompt
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:RESPONSE\s*)?#?\s*(\d+)\s*[:.]?\s*([^|]*?)\s*\|(.*)$")
            .expect("judge line pattern compiles")
    })
}

/// Parse every judge line that names an item index.
///
/// A line with a recognizable index but an unusable score yields an error
/// grade for that index. Lines with no index are ignored.
pub fn parse_judge_reply(reply: &str, max_score: u32) -> Vec<(usize, Grade)> {
    reply
        .lines()
        .filter_map(|line| {
            let caps = line_pattern().captures(line)?;
            let index: usize = caps[1].parse().ok()?;
            Some((index, parse_grade(&caps[2], &caps[3], max_score, line)))
        })
        .collect()
}

fn parse_grade(score: &str, justification: &str, max_score: u32, line: &str) -> Grade {
    let score = score.trim().trim_matches(|c| c == '[' || c == ']').trim();
    let justification = justification
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .to_string();

    match score.parse::<u32>() {
        Ok(score) if score <= max_score => Grade::Scored {
            score,
            justification,
        },
        Ok(score) => Grade::error(format!("score {} exceeds maximum {}", score, max_score)),
        Err(_) => Grade::error(format!("Could not parse grade: {}", line.trim())),
    }
}

/// Place parsed grades by their 1-based index; the first line for an index
/// wins, out-of-range indices are dropped, gaps become error grades.
pub fn align_grades(parsed: Vec<(usize, Grade)>, expected: usize) -> Vec<Grade> {
    let mut slots: Vec<Option<Grade>> = vec![None; expected];
    for (index, grade) in parsed {
        if let Some(slot) = index.checked_sub(1).and_then(|i| slots.get_mut(i)) {
            if slot.is_none() {
                *slot = Some(grade);
            }
        }
    }
    slots
        .into_iter()
        .map(|s| s.unwrap_or_else(|| Grade::error("no grade returned for this response")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl Recording {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for Recording {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(request.user.clone());
            self.reply
                .clone()
                .map_err(|_| LlmError::InvalidResponse("down".to_string()))
        }
    }

    fn item(text: &str) -> ResponseItem {
        ResponseItem {
            student: "Ada".to_string(),
            question: 1,
            question_prompt: "Healthcare app".to_string(),
            risk: 1,
            response_text: text.to_string(),
            ai_usage: "none".to_string(),
            citation: None,
            grade: None,
        }
    }

    #[test]
    fn test_parse_accepts_common_shapes() {
        let reply = "Here are the grades:\n\
RESPONSE #1: 5|5: full points\n\
#2. 4 | 4: only 1-2 sentences\n\
3: [3]|[3: citation isn't specific]\n\
response #4: five|oops";
        let parsed = parse_judge_reply(reply, 5);
        assert_eq!(parsed.len(), 4);
        assert_eq!(
            parsed[0],
            (
                1,
                Grade::Scored {
                    score: 5,
                    justification: "5: full points".to_string()
                }
            )
        );
        assert_eq!(parsed[1].1.score(), Some(4));
        assert_eq!(
            parsed[2].1,
            Grade::Scored {
                score: 3,
                justification: "3: citation isn't specific".to_string()
            }
        );
        assert_eq!(parsed[3].0, 4);
        assert!(parsed[3].1.is_error());
    }

    #[test]
    fn test_score_above_max_is_error() {
        let parsed = parse_judge_reply("RESPONSE #1: 9|great", 5);
        assert!(parsed[0].1.is_error());
    }

    #[test]
    fn test_align_pads_and_ignores_extras() {
        let parsed = vec![
            (2, Grade::Scored { score: 4, justification: "b".into() }),
            (2, Grade::Scored { score: 1, justification: "dup".into() }),
            (7, Grade::Scored { score: 5, justification: "extra".into() }),
            (0, Grade::Scored { score: 5, justification: "zero".into() }),
        ];
        let aligned = align_grades(parsed, 3);
        assert_eq!(aligned.len(), 3);
        assert!(aligned[0].is_error());
        assert_eq!(aligned[1].score(), Some(4));
        assert!(aligned[2].is_error());
    }

    #[test]
    fn test_truncate_chars_on_char_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_prompt_truncates_grounding() {
        let grading = GradingConfig {
            grounding_chars: 10,
            ..GradingConfig::default()
        };
        let a = item("An answer.");
        let prompt = build_grading_prompt(
            &grading,
            Grounding {
                target: Some("MMM/Ch4.txt"),
                content: Some("0123456789ABCDEFGHIJ"),
            },
            &[&a],
        );
        assert!(prompt.contains("0123456789\n---"));
        assert!(!prompt.contains("ABCDEF"));
        assert!(prompt.contains("RESPONSE #1:"));
    }

    #[test]
    fn test_prompt_notes_missing_source() {
        let grading = GradingConfig::default();
        let a = item("An answer.");
        let prompt = build_grading_prompt(
            &grading,
            Grounding {
                target: Some("MMM/gone.txt"),
                content: None,
            },
            &[&a],
        );
        assert!(prompt.contains("FILE NOT FOUND"));

        let prompt = build_grading_prompt(&grading, Grounding { target: None, content: None }, &[&a]);
        assert!(prompt.contains("CITATION SOURCE: none"));
        assert!(prompt.contains("treat these citations as incorrect"));
        assert!(!prompt.contains("FILE NOT FOUND"));
        assert!(!prompt.contains("CITATION SOURCE CONTENT"));
    }

    #[test]
    fn test_prompt_scores_ai_usage() {
        let grading = GradingConfig::default();
        let mut a = item("An answer.");
        a.ai_usage = "Used ChatGPT to brainstorm.".to_string();
        let prompt = build_grading_prompt(&grading, Grounding { target: None, content: None }, &[&a]);
        assert!(prompt.contains("AI USAGE DEDUCTION"));
        assert!(prompt.contains("-1 point: explained AI usage but did not give the exact prompt"));
        assert!(prompt.contains("-2 points: only stated that AI was used"));
        assert!(prompt.contains("AI Usage Statement: Used ChatGPT to brainstorm."));
    }

    #[tokio::test]
    async fn test_output_length_matches_input_for_any_reply() {
        let grading = GradingConfig::default();
        let generation = GenerationConfig::default();
        let items: Vec<ResponseItem> = (0..4).map(|i| item(&format!("Answer {}.", i))).collect();
        let refs: Vec<&ResponseItem> = items.iter().collect();
        let grounding = Grounding { target: None, content: None };

        for reply in ["", "garbage", "RESPONSE #1: 5|ok", "RESPONSE #9: 5|ok\nRESPONSE #2: 3|x"] {
            let client = Recording::replying(reply);
            let judge = GroundedJudge::new(&client, &grading, &generation);
            assert_eq!(judge.grade_batch(grounding, &refs).await.len(), 4);
        }

        let failing = Recording {
            reply: Err(()),
            prompts: Mutex::new(Vec::new()),
        };
        let judge = GroundedJudge::new(&failing, &grading, &generation);
        let grades = judge.grade_batch(grounding, &refs).await;
        assert_eq!(grades.len(), 4);
        assert!(grades.iter().all(Grade::is_error));
    }

    #[tokio::test]
    async fn test_blank_answers_skip_the_judge() {
        let grading = GradingConfig::default();
        let generation = GenerationConfig::default();
        let blank = item("   ");
        let real = item("Adding people to a late project makes it later.");
        let client = Recording::replying("RESPONSE #1: 4|4: only 1-2 sentences");
        let judge = GroundedJudge::new(&client, &grading, &generation);
        let grounding = Grounding { target: None, content: None };

        let grades = judge.grade_batch(grounding, &[&blank, &real]).await;
        assert_eq!(grades[0].to_string(), "0|0: answer missing");
        assert_eq!(grades[1].score(), Some(4));

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("RESPONSE #1:\nStudent"));
        assert!(!prompts[0].contains("RESPONSE #2:\nStudent"));
        drop(prompts);

        let only_blank = Recording::replying("unused");
        let judge = GroundedJudge::new(&only_blank, &grading, &generation);
        judge.grade_batch(grounding, &[&blank]).await;
        assert!(only_blank.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_answer_uses_context() {
        let grading = GradingConfig::default();
        let generation = GenerationConfig::default();
        let client = Recording::replying("Perseverance matters.");
        let judge = GroundedJudge::new(&client, &grading, &generation);
        let passages = vec![ContextPassage {
            title: "Grit".to_string(),
            section: "Angela Lee Duckworth".to_string(),
            score: 0.91,
            text: "x".repeat(1000),
        }];

        let answer = judge.generate_answer("What predicts success?", &passages, 500).await.unwrap();
        assert_eq!(answer, "Perseverance matters.");
        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("[1] Grit / Angela Lee Duckworth"));
        assert!(!prompts[0].contains(&"x".repeat(501)));
    }
}
