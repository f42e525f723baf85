//! Result aggregation

use crate::models::{ClassificationStatus, PerRecordResult};

/// Outcome counts. The non-malicious count is derived, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub total: usize,
    pub malicious: usize,
    pub error: usize,
}

impl Counts {
    pub fn of<'a>(results: impl IntoIterator<Item = &'a PerRecordResult>) -> Self {
        results.into_iter().fold(Counts::default(), |mut counts, r| {
            counts.total += 1;
            match r.result.status() {
                ClassificationStatus::Malicious => counts.malicious += 1,
                ClassificationStatus::Error => counts.error += 1,
                ClassificationStatus::NonMalicious => {}
            }
            counts
        })
    }

    pub fn non_malicious(&self) -> usize {
        self.total - self.malicious - self.error
    }
}

/// Results of one file, in line order
#[derive(Debug, Clone)]
pub struct FileGroup<'a> {
    pub filename: &'a str,
    pub results: Vec<&'a PerRecordResult>,
}

impl FileGroup<'_> {
    pub fn counts(&self) -> Counts {
        Counts::of(self.results.iter().copied())
    }
}

/// Group results by filename in first-seen order, keeping line order
/// within each file.
pub fn group_by_file(results: &[PerRecordResult]) -> Vec<FileGroup<'_>> {
    let mut groups: Vec<FileGroup<'_>> = Vec::new();
    for result in results {
        match groups
            .iter_mut()
            .find(|group| group.filename == result.filename)
        {
            Some(group) => group.results.push(result),
            None => groups.push(FileGroup {
                filename: &result.filename,
                results: vec![result],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttackType, ClassificationResult};

    fn result(filename: &str, line_number: usize, result: ClassificationResult) -> PerRecordResult {
        PerRecordResult {
            filename: filename.to_string(),
            line_number,
            result,
        }
    }

    fn sample() -> Vec<PerRecordResult> {
        vec![
            result("b.csv", 2, ClassificationResult::non_malicious()),
            result(
                "a.csv",
                2,
                ClassificationResult::malicious(AttackType::PathTraversal, "traversal"),
            ),
            result("b.csv", 3, ClassificationResult::error("Empty input")),
            result("a.csv", 5, ClassificationResult::non_malicious()),
            result("b.csv", 4, ClassificationResult::non_malicious()),
        ]
    }

    #[test]
    fn counts_add_up() {
        let results = sample();
        let counts = Counts::of(&results);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.malicious, 1);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.non_malicious(), 3);
        assert_eq!(
            counts.total,
            counts.malicious + counts.error + counts.non_malicious()
        );
        assert_eq!(Counts::of(&Vec::new()), Counts::default());
    }

    #[test]
    fn groups_keep_first_seen_and_line_order() {
        let results = sample();
        let groups = group_by_file(&results);
        let names: Vec<_> = groups.iter().map(|g| g.filename).collect();
        assert_eq!(names, ["b.csv", "a.csv"]);

        let lines: Vec<_> = groups[0].results.iter().map(|r| r.line_number).collect();
        assert_eq!(lines, [2, 3, 4]);
        assert_eq!(groups[0].counts().error, 1);
        assert_eq!(groups[0].counts().non_malicious(), 2);
        assert_eq!(groups[1].counts().malicious, 1);
        assert_eq!(groups[1].counts().total, 2);
    }
}
