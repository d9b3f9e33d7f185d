//! Fixture models for integration tests.
//!
//! The graph covers each relationship shape the engine resolves:
//!
//! - `Designation.user` / `Permission.designation`: a forward chain, with
//!   reverse names `designations` and `permissions`
//! - `Profile.user`: one-to-one, reverse name `profile`
//! - `Match.home` / `Match.away`: two foreign keys to `Team`, told apart by
//!   their reverse names `home_matches` and `away_matches`
//! - `Match.referee`: a nullable foreign key, joined with `LEFT JOIN`
//! - `Enrollment`: a pivot between `Student` and `Course`

use std::sync::{Arc, LazyLock};

use chrono::NaiveDateTime;
use quarry_core::QuarryResult;
use quarry_db::fields::{FieldDef, FieldType, ForeignKeyOptions};
use quarry_db::model::{Model, ModelMeta};
use quarry_db::{Registry, Row, Value};

use crate::test_database::TestDatabase;

fn pk() -> FieldDef {
    FieldDef::new("id", FieldType::BigAutoField).primary_key()
}

fn fk(name: &'static str, options: ForeignKeyOptions) -> FieldDef {
    FieldDef::foreign_key(name, options).expect("fixture relationship is valid")
}

/// A user with a secret password and automatic timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
    pub language: String,
    pub password: Option<String>,
    pub created: Option<NaiveDateTime>,
    pub updated: Option<NaiveDateTime>,
}

impl User {
    /// An unsaved user.
    pub fn new(name: &str, language: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            language: language.to_string(),
            password: None,
            created: None,
            updated: None,
        }
    }
}

impl Model for User {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "User",
                "users",
                vec![
                    pk(),
                    FieldDef::new("name", FieldType::CharField).max_length(100),
                    FieldDef::new("language", FieldType::CharField).max_length(50),
                    FieldDef::new("password", FieldType::CharField)
                        .secret()
                        .default(""),
                    FieldDef::new("created", FieldType::DateTimeField)
                        .nullable()
                        .auto_now_add(),
                    FieldDef::new("updated", FieldType::DateTimeField)
                        .nullable()
                        .auto_now(),
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
            ("created", self.created.into()),
            ("updated", self.updated.into()),
        ]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            language: row.get("language")?,
            password: row.try_get("password")?,
            created: row.try_get("created")?,
            updated: row.try_get("updated")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub id: Option<i64>,
    pub user_id: i64,
    pub bio: Option<String>,
    pub user: Option<User>,
}

impl Model for Profile {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Profile",
                "profiles",
                vec![
                    pk(),
                    FieldDef::one_to_one("user", ForeignKeyOptions::new("User").related_name("profile"))
                        .expect("fixture relationship is valid"),
                    FieldDef::new("bio", FieldType::TextField).nullable(),
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
            ("user", self.user_id.into()),
            ("bio", self.bio.clone().into()),
        ]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            bio: row.get("bio")?,
            user: row.related("user").map(|r| User::from_row(&r)).transpose()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Designation {
    pub id: Option<i64>,
    pub title: String,
    pub user_id: i64,
    pub user: Option<User>,
}

impl Model for Designation {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Designation",
                "designations",
                vec![
                    pk(),
                    FieldDef::new("title", FieldType::CharField).max_length(100),
                    fk("user", ForeignKeyOptions::new("User").related_name("designations")),
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
            ("title", self.title.clone().into()),
            ("user", self.user_id.into()),
        ]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            user_id: row.get("user_id")?,
            user: row.related("user").map(|r| User::from_row(&r)).transpose()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Permission {
    pub id: Option<i64>,
    pub code: String,
    pub designation_id: i64,
    pub designation: Option<Designation>,
}

impl Model for Permission {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Permission",
                "permissions",
                vec![
                    pk(),
                    FieldDef::new("code", FieldType::CharField).max_length(50),
                    fk(
                        "designation",
                        ForeignKeyOptions::new("Designation").related_name("permissions"),
                    ),
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
            ("code", self.code.clone().into()),
            ("designation", self.designation_id.into()),
        ]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            designation_id: row.get("designation_id")?,
            designation: row
                .related("designation")
                .map(|r| Designation::from_row(&r))
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: Option<i64>,
    pub name: String,
}

impl Model for Team {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Team",
                "teams",
                vec![pk(), FieldDef::new("name", FieldType::CharField).unique()],
            )
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Match {
    pub id: Option<i64>,
    pub home_id: i64,
    pub away_id: i64,
    pub referee_id: Option<i64>,
    pub venue: String,
    pub home: Option<Team>,
    pub away: Option<Team>,
    pub referee: Option<User>,
}

impl Model for Match {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Match",
                "matches",
                vec![
                    pk(),
                    fk("home", ForeignKeyOptions::new("Team").related_name("home_matches")),
                    fk("away", ForeignKeyOptions::new("Team").related_name("away_matches")),
                    fk(
                        "referee",
                        ForeignKeyOptions::new("User")
                            .related_name("refereed")
                            .nullable(),
                    ),
                    FieldDef::new("venue", FieldType::CharField),
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
            ("home", self.home_id.into()),
            ("away", self.away_id.into()),
            ("referee", self.referee_id.into()),
            ("venue", self.venue.clone().into()),
        ]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            home_id: row.get("home_id")?,
            away_id: row.get("away_id")?,
            referee_id: row.get("referee_id")?,
            venue: row.get("venue")?,
            home: row.related("home").map(|r| Team::from_row(&r)).transpose()?,
            away: row.related("away").map(|r| Team::from_row(&r)).transpose()?,
            referee: row.related("referee").map(|r| User::from_row(&r)).transpose()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Option<i64>,
    pub name: String,
}

impl Model for Student {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Student",
                "students",
                vec![pk(), FieldDef::new("name", FieldType::CharField)],
            )
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: Option<i64>,
    pub title: String,
}

impl Model for Course {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Course",
                "courses",
                vec![pk(), FieldDef::new("title", FieldType::CharField)],
            )
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("title", self.title.clone().into())]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
        })
    }
}

/// Links students to courses; its far side is `course`.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub id: Option<i64>,
    pub student_id: i64,
    pub course_id: i64,
}

impl Model for Enrollment {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
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
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("student", self.student_id.into()),
            ("course", self.course_id.into()),
        ]
    }

    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            student_id: row.get("student_id")?,
            course_id: row.get("course_id")?,
        })
    }
}

/// Every fixture model, referenced tables first.
pub fn metas() -> [&'static ModelMeta; 9] {
    [
        User::meta(),
        Profile::meta(),
        Designation::meta(),
        Permission::meta(),
        Team::meta(),
        Match::meta(),
        Student::meta(),
        Course::meta(),
        Enrollment::meta(),
    ]
}

/// Builds a registry holding every fixture model.
///
/// # Panics
///
/// Panics if the fixture graph fails validation.
pub fn registry() -> Arc<Registry> {
    let builder = metas()
        .into_iter()
        .fold(Registry::builder(), quarry_db::RegistryBuilder::register_meta);
    Arc::new(builder.build().expect("fixture registry is valid"))
}

/// Creates every fixture table in `db`.
pub async fn setup(db: &TestDatabase) -> QuarryResult<()> {
    db.setup_tables(&registry(), &metas()).await
}
