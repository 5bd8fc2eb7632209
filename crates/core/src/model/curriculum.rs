use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{LessonId, SectionId};
use crate::model::score::Score;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("curriculum needs at least one lesson")]
    NoLessons,

    #[error("lesson ids must run 1..=n in order; position {position} holds lesson {found}")]
    NonSequentialLesson { position: u32, found: LessonId },

    #[error("lesson {0} has no sections")]
    EmptyLesson(LessonId),

    #[error("lesson {lesson} lists section {section} twice")]
    DuplicateSection { lesson: LessonId, section: SectionId },

    #[error("unknown tab: {0}")]
    UnknownTab(String),
}

//
// ─── TABS ──────────────────────────────────────────────────────────────────────
//

/// A navigable stage of the course.
///
/// Wire names are `pretest`, `lesson1`..`lessonN` and `posttest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tab {
    PreTest,
    Lesson(LessonId),
    PostTest,
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tab::PreTest => f.write_str("pretest"),
            Tab::Lesson(id) => write!(f, "lesson{id}"),
            Tab::PostTest => f.write_str("posttest"),
        }
    }
}

impl FromStr for Tab {
    type Err = CurriculumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretest" => Ok(Tab::PreTest),
            "posttest" => Ok(Tab::PostTest),
            other => other
                .strip_prefix("lesson")
                .and_then(|n| n.parse::<LessonId>().ok())
                .map(Tab::Lesson)
                .ok_or_else(|| CurriculumError::UnknownTab(other.to_owned())),
        }
    }
}

impl TryFrom<String> for Tab {
    type Error = CurriculumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tab> for String {
    fn from(value: Tab) -> Self {
        value.to_string()
    }
}

//
// ─── LESSONS ───────────────────────────────────────────────────────────────────
//

/// Static definition of one guided lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDef {
    pub id: LessonId,
    pub title: String,
    pub sections: Vec<SectionId>,
    pub pass_threshold: Score,
}

impl LessonDef {
    /// Builds a lesson with the default quiz pass mark.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::EmptyLesson` if a section slug is blank.
    pub fn new(
        id: LessonId,
        title: impl Into<String>,
        sections: &[&str],
    ) -> Result<Self, CurriculumError> {
        let sections = sections
            .iter()
            .map(|s| SectionId::new(*s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| CurriculumError::EmptyLesson(id))?;
        Ok(Self {
            id,
            title: title.into(),
            sections,
            pass_threshold: Score::PASS_THRESHOLD,
        })
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: Score) -> Self {
        self.pass_threshold = threshold;
        self
    }

    #[must_use]
    pub fn section_index(&self, section: &SectionId) -> Option<usize> {
        self.sections.iter().position(|s| s == section)
    }
}

//
// ─── CURRICULUM ────────────────────────────────────────────────────────────────
//

/// Ordered course: a pre-test, lessons `1..=n`, then a post-test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Curriculum {
    lessons: Vec<LessonDef>,
}

impl Curriculum {
    /// Validates and builds a curriculum.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` when there are no lessons, ids are not
    /// consecutive from 1, a lesson has no sections, or a section repeats.
    pub fn new(lessons: Vec<LessonDef>) -> Result<Self, CurriculumError> {
        if lessons.is_empty() {
            return Err(CurriculumError::NoLessons);
        }
        for (position, lesson) in (1_u32..).zip(lessons.iter()) {
            if lesson.id.value() != position {
                return Err(CurriculumError::NonSequentialLesson {
                    position,
                    found: lesson.id,
                });
            }
            if lesson.sections.is_empty() {
                return Err(CurriculumError::EmptyLesson(lesson.id));
            }
            let mut seen = HashSet::with_capacity(lesson.sections.len());
            for section in &lesson.sections {
                if !seen.insert(section) {
                    return Err(CurriculumError::DuplicateSection {
                        lesson: lesson.id,
                        section: section.clone(),
                    });
                }
            }
        }
        Ok(Self { lessons })
    }

    /// The built-in four-lesson science course.
    ///
    /// # Panics
    ///
    /// Never in practice: the literal definitions are valid.
    #[must_use]
    pub fn science() -> Self {
        let build = || -> Result<Self, CurriculumError> {
            Self::new(vec![
                LessonDef::new(
                    LessonId::new(1),
                    "Matter and Its Properties",
                    &["introduction", "states-of-matter", "physical-changes", "summary"],
                )?,
                LessonDef::new(
                    LessonId::new(2),
                    "Energy Transfer",
                    &["introduction", "heat", "conduction-convection", "experiment", "summary"],
                )?,
                LessonDef::new(
                    LessonId::new(3),
                    "Forces and Motion",
                    &["introduction", "push-and-pull", "friction", "summary"],
                )?,
                LessonDef::new(
                    LessonId::new(4),
                    "Ecosystems",
                    &["introduction", "food-chains", "interdependence", "summary"],
                )?,
            ])
        };
        build().expect("built-in science curriculum is valid")
    }

    #[must_use]
    pub fn lessons(&self) -> &[LessonDef] {
        &self.lessons
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&LessonDef> {
        let index = usize::try_from(id.value()).ok()?.checked_sub(1)?;
        self.lessons.get(index)
    }

    #[must_use]
    pub fn last_lesson(&self) -> LessonId {
        // non-empty by construction
        self.lessons
            .last()
            .map_or(LessonId::new(1), |lesson| lesson.id)
    }

    /// All tabs in navigation order.
    #[must_use]
    pub fn tabs(&self) -> Vec<Tab> {
        let mut tabs = Vec::with_capacity(self.lessons.len() + 2);
        tabs.push(Tab::PreTest);
        tabs.extend(self.lessons.iter().map(|l| Tab::Lesson(l.id)));
        tabs.push(Tab::PostTest);
        tabs
    }

    /// Whether `tab` names a stage of this curriculum.
    #[must_use]
    pub fn contains(&self, tab: Tab) -> bool {
        match tab {
            Tab::Lesson(id) => self.lesson(id).is_some(),
            Tab::PreTest | Tab::PostTest => true,
        }
    }
}

impl Default for Curriculum {
    fn default() -> Self {
        Self::science()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn science_curriculum_has_ordered_tabs() {
        let c = Curriculum::science();
        let tabs: Vec<String> = c.tabs().into_iter().map(String::from).collect();
        assert_eq!(
            tabs,
            ["pretest", "lesson1", "lesson2", "lesson3", "lesson4", "posttest"]
        );
        assert_eq!(c.last_lesson(), LessonId::new(4));
    }

    #[test]
    fn tab_parses_wire_names() {
        assert_eq!("pretest".parse::<Tab>().unwrap(), Tab::PreTest);
        assert_eq!("lesson2".parse::<Tab>().unwrap(), Tab::Lesson(LessonId::new(2)));
        assert!("lesson0".parse::<Tab>().is_err());
        assert!("quiz".parse::<Tab>().is_err());
    }

    #[test]
    fn rejects_gaps_in_lesson_ids() {
        let err = Curriculum::new(vec![
            LessonDef::new(LessonId::new(1), "A", &["a"]).unwrap(),
            LessonDef::new(LessonId::new(3), "C", &["c"]).unwrap(),
        ])
        .unwrap_err();
        assert!(matches!(err, CurriculumError::NonSequentialLesson { position: 2, .. }));
    }

    #[test]
    fn rejects_empty_and_duplicate_sections() {
        let empty = LessonDef {
            id: LessonId::new(1),
            title: "Empty".into(),
            sections: Vec::new(),
            pass_threshold: Score::PASS_THRESHOLD,
        };
        assert_eq!(
            Curriculum::new(vec![empty]).unwrap_err(),
            CurriculumError::EmptyLesson(LessonId::new(1))
        );

        let dup = LessonDef::new(LessonId::new(1), "Dup", &["intro", "intro"]).unwrap();
        assert!(matches!(
            Curriculum::new(vec![dup]).unwrap_err(),
            CurriculumError::DuplicateSection { .. }
        ));
        assert_eq!(Curriculum::new(Vec::new()).unwrap_err(), CurriculumError::NoLessons);
    }

    #[test]
    fn lesson_lookup_is_one_based() {
        let c = Curriculum::science();
        assert_eq!(c.lesson(LessonId::new(1)).unwrap().title, "Matter and Its Properties");
        assert!(c.lesson(LessonId::new(5)).is_none());
        assert!(!c.contains(Tab::Lesson(LessonId::new(9))));
    }
}
