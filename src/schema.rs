//! GraphQL schema and resolvers for the students collection.
//!
//! Resolvers only translate arguments into store descriptors; all I/O goes
//! through the [`ItemProvider`] registered as schema data.

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, Object, Result, Schema, SimpleObject, ID};
use serde_json::Value;
use uuid::Uuid;

use crate::err::Error;
use crate::models::{
    student_field, DeleteInput, Location, Name, Picture, StudentInput, StudentRecord, STUDENTS,
};
use crate::scalar::Date;
use crate::store::{
    DeleteItem, DeleteOutcome, Direction, Document, Filter, FindItems, FindOne, ItemProvider,
    SaveItem, Sort, UpdateItem,
};

pub type StudentSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(provider: Arc<dyn ItemProvider>) -> StudentSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(provider)
        .finish()
}

fn provider<'a>(ctx: &Context<'a>) -> &'a Arc<dyn ItemProvider> {
    ctx.data_unchecked::<Arc<dyn ItemProvider>>()
}

pub struct Student(StudentRecord);

impl TryFrom<Document> for Student {
    type Error = Error;

    fn try_from(doc: Document) -> Result<Self, Error> {
        StudentRecord::try_from(doc).map(Student)
    }
}

fn students(docs: Vec<Document>) -> Result<Vec<Student>, Error> {
    docs.into_iter().map(Student::try_from).collect()
}

#[Object]
impl Student {
    async fn name(&self) -> Option<&Name> {
        self.0.name.as_ref()
    }

    async fn dob(&self) -> Option<Date> {
        self.0.dob
    }

    async fn picture(&self) -> Option<&Picture> {
        self.0.picture.as_ref()
    }

    async fn location(&self) -> Option<&Location> {
        self.0.location.as_ref()
    }

    async fn phone(&self) -> Option<&str> {
        self.0.phone.as_deref()
    }

    async fn cell(&self) -> Option<&str> {
        self.0.cell.as_deref()
    }

    async fn email(&self) -> Option<&str> {
        self.0.email.as_deref()
    }

    async fn registered(&self) -> Option<Date> {
        self.0.registered
    }

    async fn major(&self) -> Option<&str> {
        self.0.major.as_deref()
    }

    /// Grade point average, kept as text.
    async fn gpa(&self) -> Option<&str> {
        self.0.gpa.as_deref()
    }

    /// Server assigned identifier.
    async fn sid(&self) -> ID {
        ID(self.0.sid.clone())
    }

    async fn modified(&self) -> Option<Date> {
        self.0.modified
    }

    async fn modifiedby(&self) -> Option<&str> {
        self.0.modifiedby.as_deref()
    }
}

#[derive(Debug, Clone, Copy, SimpleObject)]
pub struct DeleteResponse {
    ok: bool,
    deleted_count: i32,
}

impl From<DeleteOutcome> for DeleteResponse {
    fn from(outcome: DeleteOutcome) -> Self {
        Self {
            ok: outcome.ok,
            deleted_count: i32::try_from(outcome.deleted_count).unwrap_or(i32::MAX),
        }
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Looks up a single student; `null` when nothing matches.
    async fn student(&self, ctx: &Context<'_>, sid: Option<ID>) -> Result<Option<Student>> {
        let Some(sid) = sid else {
            return Ok(None);
        };
        let found = provider(ctx)
            .find_one(FindOne {
                collection: STUDENTS,
                filter: Filter::equals("sid", sid.0),
            })
            .await?;
        Ok(found.map(Student::try_from).transpose()?)
    }

    /// Every student, newest first.
    async fn all_students(&self, ctx: &Context<'_>) -> Result<Vec<Student>> {
        let docs = provider(ctx).find_items(FindItems::all(STUDENTS)).await?;
        Ok(students(docs)?)
    }

    /// Students whose `field` matches the regular expression `query`,
    /// ordered by `sort` (1 ascending, -1 descending).
    async fn search(
        &self,
        ctx: &Context<'_>,
        field: Option<String>,
        query: Option<String>,
        sort: Option<String>,
        #[graphql(default = 1)] direction: i32,
    ) -> Result<Vec<Student>> {
        let field = field.ok_or_else(|| Error::invalid("`field` is required"))?;
        let pattern = query.ok_or_else(|| Error::invalid("`query` is required"))?;
        regex::Regex::new(&pattern).map_err(Error::from)?;
        let sort = match sort {
            Some(sort) => Some(Sort {
                path: student_field(&sort)?,
                direction: Direction::try_from(direction)?,
            }),
            None => None,
        };

        let descriptor = FindItems::all(STUDENTS)
            .filter(Filter::Matches {
                path: student_field(&field)?,
                pattern,
            })
            .sort(sort);
        let docs = provider(ctx).find_items(descriptor).await?;
        Ok(students(docs)?)
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Stores a new student. `sid`, `registered` and `modified` are always
    /// assigned by the server.
    async fn add_student(&self, ctx: &Context<'_>, input: StudentInput) -> Result<Student> {
        let now = Date::now();
        let mut input = input;
        input.registered = Some(now);
        input.modified = Some(now);

        let mut document = input.into_document()?;
        document.insert("sid".to_string(), Value::String(Uuid::new_v4().to_string()));

        let saved = provider(ctx)
            .save_item(SaveItem {
                collection: STUDENTS,
                document,
            })
            .await?;
        Ok(Student::try_from(saved)?)
    }

    /// Replaces the fields present in `input` on the student named by
    /// `input.sid`.
    async fn update_student(&self, ctx: &Context<'_>, input: StudentInput) -> Result<Student> {
        let mut input = input;
        let sid = input
            .sid
            .take()
            .ok_or_else(|| Error::invalid("`sid` is required to update a student"))?;
        input.modified = Some(Date::now());

        let updated = provider(ctx)
            .update_item(UpdateItem {
                collection: STUDENTS,
                filter: Filter::equals("sid", sid.0),
                patch: input.into_document()?,
            })
            .await?;
        Ok(Student::try_from(updated)?)
    }

    async fn delete_student(&self, ctx: &Context<'_>, input: DeleteInput) -> Result<DeleteResponse> {
        let sid = input
            .sid
            .ok_or_else(|| Error::invalid("`sid` is required to delete a student"))?;
        let outcome = provider(ctx)
            .delete_item(DeleteItem {
                collection: STUDENTS,
                filter: Filter::equals("sid", sid.0),
            })
            .await?;
        Ok(outcome.into())
    }
}
