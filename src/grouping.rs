//! Grouping response items by citation target, and batching each group.

use std::collections::HashMap;

use crate::models::ResponseItem;

/// All items that cite the same source. `target` is `None` for the single
/// ungrounded group (`NOT_FOUND` or never resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationGroup {
    pub target: Option<String>,
    /// Indices into the slice passed to [`group_by_citation`], in input order.
    pub items: Vec<usize>,
}

impl CitationGroup {
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = &[usize]> {
        self.items.chunks(batch_size.max(1))
    }
}

/// Partition items by citation target.
///
/// Groups come out in the order their first item appears, and each group
/// lists its items in input order.
pub fn group_by_citation(items: &[ResponseItem]) -> Vec<CitationGroup> {
    group_indices(items.iter().enumerate())
}

/// Like [`group_by_citation`] but over a subset of indices.
pub fn group_selected(items: &[ResponseItem], selected: &[usize]) -> Vec<CitationGroup> {
    group_indices(selected.iter().filter_map(|&i| items.get(i).map(|item| (i, item))))
}

fn group_indices<'a>(items: impl Iterator<Item = (usize, &'a ResponseItem)>) -> Vec<CitationGroup> {
    let mut groups: Vec<CitationGroup> = Vec::new();
    let mut position: HashMap<Option<String>, usize> = HashMap::new();

    for (index, item) in items {
        let target = item.grounding_path().map(str::to_string);
        let slot = *position.entry(target.clone()).or_insert_with(|| {
            groups.push(CitationGroup {
                target,
                items: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].items.push(index);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Citation;

    fn item(student: &str, citation: Option<Citation>) -> ResponseItem {
        ResponseItem {
            student: student.to_string(),
            question: 1,
            question_prompt: String::new(),
            risk: 1,
            response_text: "text".to_string(),
            ai_usage: String::new(),
            citation,
            grade: None,
        }
    }

    fn resolved(p: &str) -> Option<Citation> {
        Some(Citation::Resolved(p.to_string()))
    }

    #[test]
    fn test_every_item_in_exactly_one_group() {
        let items = vec![
            item("a", resolved("MMM/Ch4.txt")),
            item("b", Some(Citation::NotFound)),
            item("c", resolved("Peopleware/ch2.txt")),
            item("d", resolved("MMM/Ch4.txt")),
            item("e", None),
        ];
        let groups = group_by_citation(&items);

        let mut seen: Vec<usize> = groups.iter().flat_map(|g| g.items.clone()).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].target.as_deref(), Some("MMM/Ch4.txt"));
        assert_eq!(groups[0].items, vec![0, 3]);
        // NOT_FOUND and unresolved share the ungrounded group
        assert_eq!(groups[1].target, None);
        assert_eq!(groups[1].items, vec![1, 4]);
        assert_eq!(groups[2].items, vec![2]);
    }

    #[test]
    fn test_batches_preserve_order() {
        let items: Vec<ResponseItem> = (0..23).map(|i| item(&i.to_string(), None)).collect();
        let groups = group_by_citation(&items);
        let batches: Vec<&[usize]> = groups[0].batches(10).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[2], &[20, 21, 22]);
    }

    #[test]
    fn test_group_selected_subset() {
        let items = vec![
            item("a", resolved("x.txt")),
            item("b", resolved("x.txt")),
            item("c", resolved("y.txt")),
        ];
        let groups = group_selected(&items, &[1, 2]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].items, vec![1]);
    }
}
