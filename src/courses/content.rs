//! Lecture content access and the question/answer threads nested inside it.
//!
//! Lectures live in the `lectures` JSONB column as an array of objects
//! keyed by a uuid `id`. Each lecture may carry a `comments` array, and
//! each comment a `replies` array. Content is only served to users who
//! purchased the course.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::auth::repo::User;
use crate::error::ApiError;

#[async_trait]
pub trait LectureStore: Send + Sync {
    async fn lectures(&self, course_id: Uuid) -> anyhow::Result<Option<Value>>;
    async fn save_lectures(&self, course_id: Uuid, lectures: &Value) -> anyhow::Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub content_id: String,
    pub question: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub content_id: String,
    pub question_id: String,
    pub answer: String,
}

pub struct ContentService {
    store: Arc<dyn LectureStore>,
}

impl ContentService {
    pub fn new(store: Arc<dyn LectureStore>) -> Self {
        Self { store }
    }

    /// Full lecture list of a course, served only to its purchasers.
    pub async fn content_for(&self, user: &User, course_id: Uuid) -> Result<Value, ApiError> {
        if !user.courses.contains(&course_id) {
            return Err(ApiError::Validation(
                "You are not eligible to access this course.".into(),
            ));
        }
        self.store
            .lectures(course_id)
            .await?
            .ok_or_else(course_missing)
    }

    pub async fn add_question(
        &self,
        user: &User,
        course_id: Uuid,
        req: QuestionRequest,
    ) -> Result<(), ApiError> {
        let question = req.question.trim();
        if question.is_empty() {
            return Err(ApiError::Validation("Please provide a question.".into()));
        }
        let content_id = parse_id(&req.content_id, "content")?;

        let mut lectures = self
            .store
            .lectures(course_id)
            .await?
            .ok_or_else(course_missing)?;
        let lecture = entry_mut(&mut lectures, content_id).ok_or_else(lecture_missing)?;

        let comment = json!({
            "id": Uuid::new_v4(),
            "user": author(user),
            "question": question,
            "replies": [],
        });
        push_into(lecture, "comments", comment);

        self.store.save_lectures(course_id, &lectures).await?;
        Ok(())
    }

    pub async fn add_answer(
        &self,
        user: &User,
        course_id: Uuid,
        req: AnswerRequest,
    ) -> Result<(), ApiError> {
        let answer = req.answer.trim();
        if answer.is_empty() {
            return Err(ApiError::Validation("Please provide an answer.".into()));
        }
        let content_id = parse_id(&req.content_id, "content")?;
        let question_id = parse_id(&req.question_id, "question")?;

        let mut lectures = self
            .store
            .lectures(course_id)
            .await?
            .ok_or_else(course_missing)?;
        let lecture = entry_mut(&mut lectures, content_id).ok_or_else(lecture_missing)?;
        let comments = lecture.get_mut("comments").ok_or_else(question_missing)?;
        let question = entry_mut(comments, question_id).ok_or_else(question_missing)?;

        let reply = json!({
            "id": Uuid::new_v4(),
            "user": author(user),
            "answer": answer,
        });
        push_into(question, "replies", reply);

        self.store.save_lectures(course_id, &lectures).await?;
        Ok(())
    }
}

fn course_missing() -> ApiError {
    ApiError::NotFound("Oh no! The course you're looking for doesn't exist.".into())
}

fn lecture_missing() -> ApiError {
    ApiError::NotFound("Course content not found with this ID.".into())
}

fn question_missing() -> ApiError {
    ApiError::NotFound("Course question not found with this ID.".into())
}

fn parse_id(raw: &str, label: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::Validation(format!(
            "Oops! It seems like the {label} ID provided is invalid."
        ))
    })
}

fn author(user: &User) -> Value {
    json!({
        "id": user.id,
        "fname": user.fname,
        "lname": user.lname,
        "avatarUrl": user.avatar_url,
    })
}

/// Finds the object with the given `id` inside a JSON array.
fn entry_mut(items: &mut Value, id: Uuid) -> Option<&mut Map<String, Value>> {
    let wanted = id.to_string();
    items.as_array_mut()?.iter_mut().find_map(|item| {
        let obj = item.as_object_mut()?;
        (obj.get("id").and_then(Value::as_str) == Some(wanted.as_str())).then_some(obj)
    })
}

fn push_into(obj: &mut Map<String, Value>, key: &str, entry: Value) {
    match obj.get_mut(key) {
        Some(Value::Array(items)) => items.push(entry),
        _ => {
            obj.insert(key.to_string(), Value::Array(vec![entry]));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use time::OffsetDateTime;

    use super::*;
    use crate::auth::repo::Role;

    #[derive(Default)]
    struct MemoryLectureStore {
        courses: Mutex<HashMap<Uuid, Value>>,
    }

    #[async_trait]
    impl LectureStore for MemoryLectureStore {
        async fn lectures(&self, course_id: Uuid) -> anyhow::Result<Option<Value>> {
            Ok(self.courses.lock().unwrap().get(&course_id).cloned())
        }

        async fn save_lectures(&self, course_id: Uuid, lectures: &Value) -> anyhow::Result<()> {
            self.courses
                .lock()
                .unwrap()
                .insert(course_id, lectures.clone());
            Ok(())
        }
    }

    fn student(courses: Vec<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            fname: "Jo".into(),
            lname: "Doe".into(),
            email: "jo@x.com".into(),
            password_hash: None,
            role: Role::User,
            is_verified: true,
            is_social: false,
            active: true,
            avatar_url: None,
            courses,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn harness(course_id: Uuid, lecture_id: Uuid) -> (ContentService, Arc<MemoryLectureStore>) {
        let store = Arc::new(MemoryLectureStore::default());
        store.courses.lock().unwrap().insert(
            course_id,
            json!([{ "id": lecture_id, "title": "Intro", "videoUrl": "v.mp4" }]),
        );
        (ContentService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn purchaser_reads_course_content() {
        let (course_id, lecture_id) = (Uuid::new_v4(), Uuid::new_v4());
        let (service, _) = harness(course_id, lecture_id);

        let content = service
            .content_for(&student(vec![course_id]), course_id)
            .await
            .unwrap();
        assert_eq!(content[0]["title"], "Intro");
    }

    #[tokio::test]
    async fn content_is_denied_without_a_purchase() {
        let (course_id, lecture_id) = (Uuid::new_v4(), Uuid::new_v4());
        let (service, _) = harness(course_id, lecture_id);

        let err = service
            .content_for(&student(vec![]), course_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn question_lands_on_the_targeted_lecture() {
        let (course_id, lecture_id) = (Uuid::new_v4(), Uuid::new_v4());
        let (service, store) = harness(course_id, lecture_id);
        let user = student(vec![course_id]);

        service
            .add_question(
                &user,
                course_id,
                QuestionRequest {
                    content_id: lecture_id.to_string(),
                    question: "What codec is this?".into(),
                },
            )
            .await
            .unwrap();

        let saved = store.courses.lock().unwrap()[&course_id].clone();
        let comments = saved[0]["comments"].as_array().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0]["question"], "What codec is this?");
        assert_eq!(comments[0]["user"]["fname"], "Jo");
    }

    #[tokio::test]
    async fn answer_attaches_to_its_question() {
        let (course_id, lecture_id) = (Uuid::new_v4(), Uuid::new_v4());
        let (service, store) = harness(course_id, lecture_id);
        let user = student(vec![course_id]);

        service
            .add_question(
                &user,
                course_id,
                QuestionRequest {
                    content_id: lecture_id.to_string(),
                    question: "Where are the slides?".into(),
                },
            )
            .await
            .unwrap();
        let question_id = {
            let saved = store.courses.lock().unwrap();
            saved[&course_id][0]["comments"][0]["id"]
                .as_str()
                .unwrap()
                .to_string()
        };

        service
            .add_answer(
                &user,
                course_id,
                AnswerRequest {
                    content_id: lecture_id.to_string(),
                    question_id,
                    answer: "Linked in the description.".into(),
                },
            )
            .await
            .unwrap();

        let saved = store.courses.lock().unwrap()[&course_id].clone();
        let replies = saved[0]["comments"][0]["replies"].as_array().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["answer"], "Linked in the description.");
    }

    #[tokio::test]
    async fn unknown_lecture_id_is_reported() {
        let (course_id, lecture_id) = (Uuid::new_v4(), Uuid::new_v4());
        let (service, _) = harness(course_id, lecture_id);

        let err = service
            .add_question(
                &student(vec![course_id]),
                course_id,
                QuestionRequest {
                    content_id: Uuid::new_v4().to_string(),
                    question: "Anyone home?".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_content_id_is_rejected_before_lookup() {
        let (course_id, lecture_id) = (Uuid::new_v4(), Uuid::new_v4());
        let (service, _) = harness(course_id, lecture_id);

        let err = service
            .add_question(
                &student(vec![course_id]),
                course_id,
                QuestionRequest {
                    content_id: "not-a-uuid".into(),
                    question: "Hm?".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
