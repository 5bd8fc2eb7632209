use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::curriculum::{Curriculum, LessonDef, Tab};
use crate::model::ids::{LessonId, SectionId, UserId};
use crate::model::score::Score;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("{0} is locked")]
    Locked(Tab),

    #[error("{0} was already completed")]
    AlreadyCompleted(Tab),

    #[error("lesson {0} is not part of the curriculum")]
    UnknownLesson(LessonId),

    #[error("lesson {lesson} has no section {section}")]
    UnknownSection { lesson: LessonId, section: SectionId },

    #[error("lesson {lesson}: expected section {expected}, got {got}")]
    OutOfOrder {
        lesson: LessonId,
        expected: SectionId,
        got: SectionId,
    },

    #[error("lesson {lesson} still has {remaining} section(s) before the quiz")]
    SectionsIncomplete { lesson: LessonId, remaining: usize },

    #[error("inconsistent progress record: {0}")]
    Inconsistent(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Result slot for the pre-test or post-test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub score: Option<Score>,
    pub completed: bool,
}

/// Per-lesson progress: completed sections (always a prefix of the lesson's
/// section order), best quiz score, completion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub lesson_id: LessonId,
    #[serde(default)]
    pub completed_sections: Vec<SectionId>,
    #[serde(default)]
    pub quiz_score: Option<Score>,
    #[serde(default)]
    pub completed: bool,
}

impl LessonProgress {
    #[must_use]
    pub fn fresh(lesson_id: LessonId) -> Self {
        Self {
            lesson_id,
            completed_sections: Vec::new(),
            quiz_score: None,
            completed: false,
        }
    }

    fn has_activity(&self) -> bool {
        !self.completed_sections.is_empty() || self.quiz_score.is_some() || self.completed
    }
}

/// What a quiz attempt changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuizOutcome {
    /// Whether this attempt alone met the threshold.
    pub passed: bool,
    /// Best score across all attempts.
    pub best: Score,
    /// The tab this attempt unlocked, if it completed the lesson for the first time.
    pub unlocked: Option<Tab>,
}

/// A student's position in the course.
///
/// Unlock gates:
/// - the pre-test is always open;
/// - lesson 1 opens once the pre-test is completed, whatever the score;
/// - lesson N opens once lesson N-1 is completed (quiz ≥ threshold);
/// - the post-test opens once the last lesson is completed.
///
/// Every successful mutation stamps `updated_at`, which drives
/// last-write-wins reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProgress {
    user_id: UserId,
    pretest: AssessmentResult,
    lessons: Vec<LessonProgress>,
    posttest: AssessmentResult,
    updated_at: DateTime<Utc>,
}

impl StudentProgress {
    #[must_use]
    pub fn new(user_id: UserId, curriculum: &Curriculum, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            pretest: AssessmentResult::default(),
            lessons: curriculum
                .lessons()
                .iter()
                .map(|l| LessonProgress::fresh(l.id))
                .collect(),
            posttest: AssessmentResult::default(),
            updated_at: now,
        }
    }

    /// Rehydrate a record from storage without checking gates.
    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        pretest: AssessmentResult,
        lessons: Vec<LessonProgress>,
        posttest: AssessmentResult,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            pretest,
            lessons,
            posttest,
            updated_at,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn pretest(&self) -> AssessmentResult {
        self.pretest
    }

    #[must_use]
    pub fn posttest(&self) -> AssessmentResult {
        self.posttest
    }

    #[must_use]
    pub fn lessons(&self) -> &[LessonProgress] {
        &self.lessons
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&LessonProgress> {
        self.lessons.iter().find(|l| l.lesson_id == id)
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ─── Gates ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn is_completed(&self, tab: Tab) -> bool {
        match tab {
            Tab::PreTest => self.pretest.completed,
            Tab::Lesson(id) => self.lesson(id).is_some_and(|l| l.completed),
            Tab::PostTest => self.posttest.completed,
        }
    }

    #[must_use]
    pub fn is_unlocked(&self, curriculum: &Curriculum, tab: Tab) -> bool {
        match tab {
            Tab::PreTest => true,
            Tab::Lesson(id) => {
                curriculum.lesson(id).is_some()
                    && match id.previous() {
                        None => self.pretest.completed,
                        Some(prev) => self.is_completed(Tab::Lesson(prev)),
                    }
            }
            Tab::PostTest => self.is_completed(Tab::Lesson(curriculum.last_lesson())),
        }
    }

    #[must_use]
    pub fn unlocked_tabs(&self, curriculum: &Curriculum) -> Vec<Tab> {
        curriculum
            .tabs()
            .into_iter()
            .filter(|tab| self.is_unlocked(curriculum, *tab))
            .collect()
    }

    /// First tab not yet completed; the post-test once the course is done.
    #[must_use]
    pub fn current_tab(&self, curriculum: &Curriculum) -> Tab {
        curriculum
            .tabs()
            .into_iter()
            .find(|tab| !self.is_completed(*tab))
            .unwrap_or(Tab::PostTest)
    }

    /// Share of course steps done: the two tests, every section, every quiz.
    #[must_use]
    pub fn percent_complete(&self, curriculum: &Curriculum) -> u8 {
        let mut total = 2_usize;
        let mut done = usize::from(self.pretest.completed) + usize::from(self.posttest.completed);
        for def in curriculum.lessons() {
            total += def.sections.len() + 1;
            if let Some(entry) = self.lesson(def.id) {
                done += entry.completed_sections.len().min(def.sections.len());
                done += usize::from(entry.completed);
            }
        }
        u8::try_from(done * 100 / total).unwrap_or(100)
    }

    // ─── Transitions ───────────────────────────────────────────────────────

    /// Record the diagnostic pre-test. Any score opens lesson 1.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::AlreadyCompleted` on a second attempt.
    pub fn complete_pretest(&mut self, score: Score, now: DateTime<Utc>) -> Result<(), ProgressError> {
        if self.pretest.completed {
            return Err(ProgressError::AlreadyCompleted(Tab::PreTest));
        }
        self.pretest = AssessmentResult {
            score: Some(score),
            completed: true,
        };
        self.touch(now);
        Ok(())
    }

    /// Mark the next pending section of a lesson as done.
    ///
    /// Returns `false` (and leaves `updated_at` alone) when the section was
    /// already completed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLesson`/`UnknownSection` for ids outside the
    /// curriculum, `Locked` if the lesson is not open yet, and `OutOfOrder`
    /// when the section skips ahead.
    pub fn complete_section(
        &mut self,
        curriculum: &Curriculum,
        lesson: LessonId,
        section: &SectionId,
        now: DateTime<Utc>,
    ) -> Result<bool, ProgressError> {
        let def = self.open_lesson(curriculum, lesson)?;
        let index = def
            .section_index(section)
            .ok_or_else(|| ProgressError::UnknownSection {
                lesson,
                section: section.clone(),
            })?;
        let expected = {
            let entry = self.entry_mut(lesson)?;
            let done = entry.completed_sections.len();
            if index < done {
                return Ok(false);
            }
            if index > done {
                def.sections.get(done).cloned()
            } else {
                entry.completed_sections.push(section.clone());
                None
            }
        };
        if let Some(expected) = expected {
            return Err(ProgressError::OutOfOrder {
                lesson,
                expected,
                got: section.clone(),
            });
        }
        self.touch(now);
        Ok(true)
    }

    /// The section a student should work on next, `None` once all are done
    /// or when the lesson does not exist.
    #[must_use]
    pub fn next_section<'c>(
        &self,
        curriculum: &'c Curriculum,
        lesson: LessonId,
    ) -> Option<&'c SectionId> {
        let def = curriculum.lesson(lesson)?;
        let done = self.lesson(lesson).map_or(0, |l| l.completed_sections.len());
        def.sections.get(done)
    }

    /// Record a quiz attempt for a lesson. The best score is kept; reaching
    /// the lesson threshold completes the lesson and opens the next tab.
    ///
    /// # Errors
    ///
    /// Returns `Locked` for a closed lesson and `SectionsIncomplete` while
    /// sections remain.
    pub fn record_quiz(
        &mut self,
        curriculum: &Curriculum,
        lesson: LessonId,
        score: Score,
        now: DateTime<Utc>,
    ) -> Result<QuizOutcome, ProgressError> {
        let def = self.open_lesson(curriculum, lesson)?;
        let threshold = def.pass_threshold;
        let section_count = def.sections.len();
        let next_tab = match curriculum.lesson(LessonId::new(lesson.value() + 1)) {
            Some(next) => Tab::Lesson(next.id),
            None => Tab::PostTest,
        };

        let entry = self.entry_mut(lesson)?;
        let remaining = section_count.saturating_sub(entry.completed_sections.len());
        if remaining > 0 {
            return Err(ProgressError::SectionsIncomplete { lesson, remaining });
        }

        let best = entry.quiz_score.map_or(score, |prev| prev.max(score));
        entry.quiz_score = Some(best);
        let newly_completed = !entry.completed && best.passes(threshold);
        if newly_completed {
            entry.completed = true;
        }
        self.touch(now);

        Ok(QuizOutcome {
            passed: score.passes(threshold),
            best,
            unlocked: newly_completed.then_some(next_tab),
        })
    }

    /// Record the summative post-test.
    ///
    /// # Errors
    ///
    /// Returns `Locked` before the last lesson is completed and
    /// `AlreadyCompleted` on a second attempt.
    pub fn complete_posttest(
        &mut self,
        curriculum: &Curriculum,
        score: Score,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        if !self.is_unlocked(curriculum, Tab::PostTest) {
            return Err(ProgressError::Locked(Tab::PostTest));
        }
        if self.posttest.completed {
            return Err(ProgressError::AlreadyCompleted(Tab::PostTest));
        }
        self.posttest = AssessmentResult {
            score: Some(score),
            completed: true,
        };
        self.touch(now);
        Ok(())
    }

    /// Wipe everything back to a fresh record.
    pub fn reset(&mut self, curriculum: &Curriculum, now: DateTime<Utc>) {
        *self = Self::new(self.user_id, curriculum, now);
    }

    /// Make the lesson list match `curriculum`: keep known lessons in order,
    /// add fresh entries for new ones, drop unknown ones.
    pub fn align_with(&mut self, curriculum: &Curriculum) {
        let mut aligned = Vec::with_capacity(curriculum.lessons().len());
        for def in curriculum.lessons() {
            match self.lessons.iter().position(|l| l.lesson_id == def.id) {
                Some(i) => aligned.push(self.lessons.swap_remove(i)),
                None => aligned.push(LessonProgress::fresh(def.id)),
            }
        }
        self.lessons = aligned;
    }

    /// Verify the record obeys the unlock gates of `curriculum`. Used on
    /// whole-record writes coming from clients.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Inconsistent` describing the first violation.
    pub fn check(&self, curriculum: &Curriculum) -> Result<(), ProgressError> {
        let bad = |msg: String| Err(ProgressError::Inconsistent(msg));

        if self.pretest.completed != self.pretest.score.is_some() {
            return bad("pre-test score and completion disagree".into());
        }
        if self.lessons.len() != curriculum.lessons().len() {
            return bad(format!(
                "expected {} lessons, found {}",
                curriculum.lessons().len(),
                self.lessons.len()
            ));
        }
        for (def, entry) in curriculum.lessons().iter().zip(&self.lessons) {
            if entry.lesson_id != def.id {
                return bad(format!("lesson {} out of place", entry.lesson_id));
            }
            if !def.sections.starts_with(&entry.completed_sections) {
                return bad(format!("lesson {} sections are out of order", def.id));
            }
            if entry.has_activity() && !self.is_unlocked(curriculum, Tab::Lesson(def.id)) {
                return bad(format!("lesson {} has progress but is locked", def.id));
            }
            let all_sections = entry.completed_sections.len() == def.sections.len();
            if entry.quiz_score.is_some() && !all_sections {
                return bad(format!("lesson {} quiz taken before sections", def.id));
            }
            let passed = entry.quiz_score.is_some_and(|s| s.passes(def.pass_threshold));
            if entry.completed != passed {
                return bad(format!("lesson {} completion does not match quiz score", def.id));
            }
        }
        if self.posttest.completed != self.posttest.score.is_some() {
            return bad("post-test score and completion disagree".into());
        }
        if self.posttest.completed && !self.is_unlocked(curriculum, Tab::PostTest) {
            return bad("post-test completed while locked".into());
        }
        Ok(())
    }

    fn open_lesson<'c>(
        &self,
        curriculum: &'c Curriculum,
        lesson: LessonId,
    ) -> Result<&'c LessonDef, ProgressError> {
        let def = curriculum
            .lesson(lesson)
            .ok_or(ProgressError::UnknownLesson(lesson))?;
        if !self.is_unlocked(curriculum, Tab::Lesson(lesson)) {
            return Err(ProgressError::Locked(Tab::Lesson(lesson)));
        }
        Ok(def)
    }

    fn entry_mut(&mut self, lesson: LessonId) -> Result<&mut LessonProgress, ProgressError> {
        if self.lesson(lesson).is_none() {
            self.lessons.push(LessonProgress::fresh(lesson));
            self.lessons.sort_by_key(|l| l.lesson_id);
        }
        self.lessons
            .iter_mut()
            .find(|l| l.lesson_id == lesson)
            .ok_or(ProgressError::UnknownLesson(lesson))
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Last-write-wins merge of a locally cached copy and the remote copy.
///
/// The copy with the later `updated_at` wins; ties go to the remote copy so
/// every client converges on what the server holds.
#[must_use]
pub fn reconcile(
    local: Option<StudentProgress>,
    remote: Option<StudentProgress>,
) -> Option<StudentProgress> {
    match (local, remote) {
        (Some(local), Some(remote)) => {
            if local.updated_at > remote.updated_at {
                Some(local)
            } else {
                Some(remote)
            }
        }
        (local, None) => local,
        (None, remote) => remote,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
