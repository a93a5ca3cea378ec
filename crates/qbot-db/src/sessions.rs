//! Sessions store for persistent questionnaire storage.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

use qbot_core::{Conversation, QaItem, Stage};

/// A fully loaded session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub conversation: Conversation,
    pub updated_at: DateTime<Utc>,
}

/// Summary for list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub stage: Stage,
    pub question_count: usize,
    pub answer_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Filter parameters for listing sessions.
#[derive(Debug, Default, Clone)]
pub struct SessionFilter {
    pub stage: Option<Stage>,
    pub limit: Option<usize>,
}

/// Sessions store with a borrowed connection.
pub struct Sessions<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Sessions<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    /// Save a conversation, replacing any stored items for the session.
    pub fn save(&self, session_id: &str, conversation: &Conversation) -> Result<(), rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO sessions (id, stage, max_questions, created_at, updated_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                stage = excluded.stage,
                max_questions = excluded.max_questions,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at
            "#,
            params![
                session_id,
                conversation.stage().as_str(),
                conversation.max_questions() as i64,
                conversation.started_at().to_rfc3339(),
                Utc::now().to_rfc3339(),
                conversation.completed_at().map(|t| t.to_rfc3339()),
            ],
        )?;

        tx.execute("DELETE FROM qa_items WHERE session_id = ?1", params![session_id])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO qa_items (session_id, position, role, question, answer) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, item) in conversation.items().iter().enumerate() {
                let (question, answer) = if item.is_question() {
                    (item.text(), "")
                } else {
                    ("", item.text())
                };
                stmt.execute(params![
                    session_id,
                    position as i64,
                    item.role().as_str(),
                    question,
                    answer,
                ])?;
            }
        }

        tx.commit()
    }

    /// Get a session by ID, including all items in order.
    pub fn get(&self, id: &str) -> Result<Option<SessionRecord>, rusqlite::Error> {
        let header = self
            .conn
            .query_row(
                "SELECT stage, max_questions, created_at, updated_at, completed_at FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((stage, max_questions, created_at, updated_at, completed_at)) = header else {
            return Ok(None);
        };

        let stage: Stage = stage.parse().map_err(|e| conversion_error(0, e))?;
        let items = self.get_items(id)?;
        let conversation = Conversation::restore(
            items,
            max_questions.max(0) as usize,
            stage,
            parse_timestamp(&created_at),
            completed_at.as_deref().map(parse_timestamp),
        )
        .map_err(|e| conversion_error(0, e))?;

        Ok(Some(SessionRecord {
            id: id.to_string(),
            conversation,
            updated_at: parse_timestamp(&updated_at),
        }))
    }

    /// List sessions, most recently updated first.
    pub fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionSummary>, rusqlite::Error> {
        let mut sql = String::from(
            r#"
            SELECT s.id, s.stage, s.created_at, s.updated_at, s.completed_at,
                   COALESCE(SUM(CASE WHEN q.role = 'assistant' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN q.role = 'user' THEN 1 ELSE 0 END), 0)
            FROM sessions s
            LEFT JOIN qa_items q ON q.session_id = s.id
            WHERE 1=1
            "#,
        );
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(stage) = filter.stage {
            sql.push_str(" AND s.stage = ?");
            param_values.push(Box::new(stage.as_str().to_string()));
        }

        sql.push_str(" GROUP BY s.id ORDER BY s.updated_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params: Vec<&dyn rusqlite::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), Self::row_to_summary)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }

        Ok(summaries)
    }

    /// Delete a session and its items.
    pub fn delete(&self, id: &str) -> Result<bool, rusqlite::Error> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows_affected > 0)
    }

    fn get_items(&self, session_id: &str) -> Result<Vec<QaItem>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT role, question, answer FROM qa_items WHERE session_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            let role: String = row.get(0)?;
            let question: String = row.get(1)?;
            let answer: String = row.get(2)?;
            let role = role.parse().map_err(|e| conversion_error(0, e))?;
            QaItem::new(role, question, answer).map_err(|e| conversion_error(1, e))
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    fn row_to_summary(row: &rusqlite::Row) -> Result<SessionSummary, rusqlite::Error> {
        let stage: String = row.get(1)?;
        let created_at: String = row.get(2)?;
        let updated_at: String = row.get(3)?;
        let completed_at: Option<String> = row.get(4)?;
        let question_count: i64 = row.get(5)?;
        let answer_count: i64 = row.get(6)?;

        Ok(SessionSummary {
            id: row.get(0)?,
            stage: stage.parse().map_err(|e| conversion_error(1, e))?,
            question_count: question_count.max(0) as usize,
            answer_count: answer_count.max(0) as usize,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
            completed_at: completed_at.as_deref().map(parse_timestamp),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn conversion_error(column: usize, err: qbot_core::ConversationError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}
