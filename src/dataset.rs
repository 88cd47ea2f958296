//! The student response dataset.
//!
//! Input shape:
//!
//! ```json
//! { "Students": [ { "Student": "Ada",
//!     "Question 1": { "Risk/mitigation 1": "...",
//!                     "Risk/mitigation 1 citation": "MMM/Ch4.txt",
//!                     "Risk/mitigation 1 grade": "4|4: only 1-2 sentences",
//!                     "AI usage": "..." } } ] }
//! ```
//!
//! [`Dataset::from_value`] flattens this into typed [`ResponseItem`]s and
//! fails on structural problems before any work starts. Only the
//! `... citation` and `... grade` fields are ever written back; every other
//! field, and the key order of the file, is preserved.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

use crate::config::GradingConfig;
use crate::models::{Citation, Grade, ResponseItem};

const STUDENTS_KEY: &str = "Students";
const STUDENT_KEY: &str = "Student";
const QUESTION_PREFIX: &str = "Question ";
const RISK_PREFIX: &str = "Risk/mitigation ";
const CITATION_SUFFIX: &str = " citation";
const GRADE_SUFFIX: &str = " grade";
const AI_USAGE_KEY: &str = "AI usage";

/// Where an item's fields live in the JSON tree.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemLocator {
    student_index: usize,
    question_key: String,
    field: String,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    root: Value,
    items: Vec<ResponseItem>,
    locators: Vec<ItemLocator>,
}

impl Dataset {
    pub fn load(path: &Path, grading: &GradingConfig) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
        let root: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse dataset JSON: {}", path.display()))?;
        Self::from_value(root, grading)
    }

    pub fn from_value(root: Value, grading: &GradingConfig) -> Result<Self> {
        let students = root
            .get(STUDENTS_KEY)
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Dataset is missing the top-level \"{}\" array", STUDENTS_KEY))?;

        let mut items = Vec::new();
        let mut locators = Vec::new();

        for (student_index, student) in students.iter().enumerate() {
            let record = student
                .as_object()
                .ok_or_else(|| anyhow!("Students[{}] is not an object", student_index))?;
            let name = record
                .get(STUDENT_KEY)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    anyhow!("Students[{}] is missing the \"{}\" name", student_index, STUDENT_KEY)
                })?;

            for (question_key, question_value) in record {
                let Some(suffix) = question_key.strip_prefix(QUESTION_PREFIX) else {
                    continue;
                };
                let question = parse_number(suffix).with_context(|| {
                    format!("Student '{}': bad question key '{}'", name, question_key)
                })?;
                let fields = question_value.as_object().ok_or_else(|| {
                    anyhow!("Student '{}': '{}' is not an object", name, question_key)
                })?;

                let ai_usage = string_field(fields, AI_USAGE_KEY).unwrap_or_default();

                for (field, value) in fields {
                    let Some(suffix) = field.strip_prefix(RISK_PREFIX) else {
                        continue;
                    };
                    if field.ends_with(CITATION_SUFFIX) || field.ends_with(GRADE_SUFFIX) {
                        continue;
                    }
                    let risk = parse_number(suffix).with_context(|| {
                        format!("Student '{}', {}: bad field '{}'", name, question_key, field)
                    })?;
                    let response_text = match value {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        _ => bail!(
                            "Student '{}', {}: '{}' must be a string",
                            name,
                            question_key,
                            field
                        ),
                    };

                    let citation = string_field(fields, &format!("{}{}", field, CITATION_SUFFIX))
                        .map(|s| Citation::from_field(&s));
                    let grade = string_field(fields, &format!("{}{}", field, GRADE_SUFFIX))
                        .map(|s| Grade::from_field(&s));

                    items.push(ResponseItem {
                        student: name.to_string(),
                        question,
                        question_prompt: grading.question_prompt(question).to_string(),
                        risk,
                        response_text,
                        ai_usage: ai_usage.clone(),
                        citation,
                        grade,
                    });
                    locators.push(ItemLocator {
                        student_index,
                        question_key: question_key.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        Ok(Self {
            root,
            items,
            locators,
        })
    }

    pub fn items(&self) -> &[ResponseItem] {
        &self.items
    }

    pub fn set_citation(&mut self, index: usize, citation: Citation) -> Result<()> {
        let value = citation.to_string();
        self.write_field(index, CITATION_SUFFIX, value)?;
        self.items[index].citation = Some(citation);
        Ok(())
    }

    pub fn set_grade(&mut self, index: usize, grade: Grade) -> Result<()> {
        let value = grade.to_string();
        self.write_field(index, GRADE_SUFFIX, value)?;
        self.items[index].grade = Some(grade);
        Ok(())
    }

    fn write_field(&mut self, index: usize, suffix: &str, value: String) -> Result<()> {
        let locator = self
            .locators
            .get(index)
            .ok_or_else(|| anyhow!("No response item at index {}", index))?;

        let fields = self
            .root
            .get_mut(STUDENTS_KEY)
            .and_then(|s| s.get_mut(locator.student_index))
            .and_then(|s| s.get_mut(&locator.question_key))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow!("Dataset structure changed under item {}", index))?;

        fields.insert(format!("{}{}", locator.field, suffix), Value::String(value));
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut json = self.to_json_pretty()?;
        json.push('\n');
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write dataset: {}", path.display()))
    }
}

fn parse_number(suffix: &str) -> Result<u32> {
    suffix
        .trim()
        .parse::<u32>()
        .map_err(|_| anyhow!("expected a number, got '{}'", suffix))
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "Course": "CS 4500",
            "Students": [
                {
                    "Student": "Ada",
                    "Question 1": {
                        "Risk/mitigation 1": "Adding people late makes it later.",
                        "Risk/mitigation 1 citation": "MMM/Ch2.txt",
                        "Risk/mitigation 2": "",
                        "AI usage": "none"
                    },
                    "Notes": "keep me"
                },
                {
                    "Student": "Grace",
                    "Question 2": {
                        "Risk/mitigation 1": "Quiet offices help.",
                        "Risk/mitigation 1 grade": "5|5: full points"
                    }
                }
            ]
        })
    }

    #[test]
    fn test_flattens_items_in_order() {
        let mut grading = GradingConfig::default();
        grading
            .questions
            .insert("1".to_string(), "Healthcare app".to_string());
        let ds = Dataset::from_value(sample(), &grading).unwrap();
        let items = ds.items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].student, "Ada");
        assert_eq!(items[0].question, 1);
        assert_eq!(items[0].question_prompt, "Healthcare app");
        assert_eq!(items[0].ai_usage, "none");
        assert_eq!(
            items[0].citation,
            Some(Citation::Resolved("MMM/Ch2.txt".to_string()))
        );
        assert_eq!(items[1].risk, 2);
        assert!(!items[1].has_answer());
        assert_eq!(items[2].question, 2);
        assert_eq!(items[2].grade.as_ref().and_then(Grade::score), Some(5));
    }

    #[test]
    fn test_write_back_touches_only_derived_fields() {
        let grading = GradingConfig::default();
        let mut ds = Dataset::from_value(sample(), &grading).unwrap();
        ds.set_citation(1, Citation::NotFound).unwrap();
        ds.set_grade(
            0,
            Grade::Scored {
                score: 4,
                justification: "4: only 1-2 sentences".to_string(),
            },
        )
        .unwrap();

        let out: Value = serde_json::from_str(&ds.to_json_pretty().unwrap()).unwrap();
        let q1 = &out["Students"][0]["Question 1"];
        assert_eq!(q1["Risk/mitigation 2 citation"], "NOT_FOUND");
        assert_eq!(q1["Risk/mitigation 1 grade"], "4|4: only 1-2 sentences");
        assert_eq!(q1["Risk/mitigation 1"], "Adding people late makes it later.");
        assert_eq!(out["Students"][0]["Notes"], "keep me");
        assert_eq!(out["Course"], "CS 4500");
    }

    #[test]
    fn test_key_order_preserved() {
        let grading = GradingConfig::default();
        let ds = Dataset::from_value(sample(), &grading).unwrap();
        let text = ds.to_json_pretty().unwrap();
        let course = text.find("\"Course\"").unwrap();
        let students = text.find("\"Students\"").unwrap();
        assert!(course < students);
    }

    #[test]
    fn test_missing_students_fails_fast() {
        let grading = GradingConfig::default();
        let err = Dataset::from_value(json!({ "students": [] }), &grading).unwrap_err();
        assert!(err.to_string().contains("Students"));
    }

    #[test]
    fn test_missing_student_name_fails_fast() {
        let grading = GradingConfig::default();
        let value = json!({ "Students": [ { "Question 1": {} } ] });
        assert!(Dataset::from_value(value, &grading).is_err());
    }

    #[test]
    fn test_bad_question_number_fails_fast() {
        let grading = GradingConfig::default();
        let value = json!({ "Students": [ { "Student": "Ada", "Question one": {} } ] });
        assert!(Dataset::from_value(value, &grading).is_err());
    }
}
