//! Shared fixtures for unit tests: a small model graph and a recording
//! executor that serves canned rows.

use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use quarry_core::QuarryResult;

use crate::executor::DbExecutor;
use crate::fields::{FieldDef, FieldType, ForeignKeyOptions};
use crate::model::{Model, ModelMeta};
use crate::query::compiler::DatabaseBackendType;
use crate::registry::Registry;
use crate::row::Row;
use crate::value::Value;

pub const MODEL_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
    pub language: String,
    pub password: Option<String>,
}

impl Model for User {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "User",
                "users",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("name", FieldType::CharField).max_length(100),
                    FieldDef::new("language", FieldType::CharField).max_length(50),
                    FieldDef::new("password", FieldType::CharField)
                        .secret()
                        .default(""),
                ],
            )
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("language", self.language.clone().into()),
            ("password", self.password.clone().into()),
        ]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            language: row.get("language")?,
            password: row.try_get("password")?,
        })
    }
}

macro_rules! id_model {
    ($ty:ident, $meta:expr) => {
        #[derive(Debug, Clone)]
        pub struct $ty {
            pub id: Option<i64>,
        }

        impl Model for $ty {
            fn meta() -> &'static ModelMeta {
                static META: LazyLock<ModelMeta> = LazyLock::new(|| $meta);
                &META
            }

            fn pk(&self) -> Option<Value> {
                self.id.map(Value::Int)
            }

            fn field_values(&self) -> Vec<(&'static str, Value)> {
                vec![("id", self.id.into())]
            }

            fn from_row(row: &Row) -> QuarryResult<Self> {
                Ok(Self { id: row.get("id")? })
            }
        }
    };
}

fn pk() -> FieldDef {
    FieldDef::new("id", FieldType::BigAutoField).primary_key()
}

fn fk(name: &'static str, options: ForeignKeyOptions) -> FieldDef {
    FieldDef::foreign_key(name, options).expect("valid relationship")
}

id_model!(
    Designation,
    ModelMeta::new(
        "Designation",
        "designations",
        vec![
            pk(),
            FieldDef::new("title", FieldType::CharField),
            fk("user", ForeignKeyOptions::new("User").related_name("designations")),
        ],
    )
);

id_model!(
    Permission,
    ModelMeta::new(
        "Permission",
        "permissions",
        vec![
            pk(),
            FieldDef::new("code", FieldType::CharField),
            fk("designation", ForeignKeyOptions::new("Designation").related_name("permissions")),
        ],
    )
);

id_model!(
    Profile,
    ModelMeta::new(
        "Profile",
        "profiles",
        vec![
            pk(),
            FieldDef::one_to_one("user", ForeignKeyOptions::new("User").related_name("profile"))
                .expect("valid relationship"),
            FieldDef::new("bio", FieldType::TextField).nullable(),
        ],
    )
);

id_model!(
    Team,
    ModelMeta::new(
        "Team",
        "teams",
        vec![pk(), FieldDef::new("name", FieldType::CharField)],
    )
);

id_model!(
    Match,
    ModelMeta::new(
        "Match",
        "matches",
        vec![
            pk(),
            fk("home", ForeignKeyOptions::new("Team").related_name("home_matches")),
            fk("away", ForeignKeyOptions::new("Team").related_name("away_matches")),
            fk("referee", ForeignKeyOptions::new("User").nullable()),
            FieldDef::new("venue", FieldType::CharField),
        ],
    )
);

id_model!(
    Rivalry,
    ModelMeta::new(
        "Rivalry",
        "rivalries",
        vec![
            pk(),
            fk("left", ForeignKeyOptions::new("Team")),
            fk("right", ForeignKeyOptions::new("Team")),
        ],
    )
);

id_model!(
    Student,
    ModelMeta::new(
        "Student",
        "students",
        vec![pk(), FieldDef::new("name", FieldType::CharField)],
    )
);

id_model!(
    Course,
    ModelMeta::new(
        "Course",
        "courses",
        vec![pk(), FieldDef::new("title", FieldType::CharField)],
    )
);

id_model!(
    Enrollment,
    ModelMeta::new(
        "Enrollment",
        "enrollments",
        vec![
            pk(),
            fk("student", ForeignKeyOptions::new("Student").related_name("enrollments")),
            fk("course", ForeignKeyOptions::new("Course").related_name("enrollments")),
        ],
    )
    .pivot("course")
);

/// Builds a registry holding every fixture model.
pub fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .register::<User>()
            .register::<Profile>()
            .register::<Designation>()
            .register::<Permission>()
            .register::<Team>()
            .register::<Match>()
            .register::<Rivalry>()
            .register::<Student>()
            .register::<Course>()
            .register::<Enrollment>()
            .build()
            .expect("fixture registry is valid"),
    )
}

/// Serves queued result sets in order and records every statement.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    pub results: Mutex<Vec<Vec<Row>>>,
    pub log: Mutex<Vec<(String, Vec<Value>)>>,
    pub next_id: Mutex<i64>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one result set for the next `query` call.
    pub fn push(&self, rows: Vec<Row>) -> &Self {
        self.results.lock().unwrap().push(rows);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn params(&self, index: usize) -> Vec<Value> {
        self.log.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl DbExecutor for RecordingExecutor {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> QuarryResult<u64> {
        self.log
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> QuarryResult<Vec<Row>> {
        self.log
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(results.remove(0))
        }
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> QuarryResult<Value> {
        self.execute_sql(sql, params).await?;
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        Ok(Value::Int(*next))
    }
}

pub fn user_row(id: i64, name: &str, language: &str) -> Row {
    Row::from_pairs([
        ("id", Value::Int(id)),
        ("name", Value::from(name)),
        ("language", Value::from(language)),
        ("password", Value::from("")),
    ])
}
