use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params_from_iter, types::Value};

use gradepoint_core::{
    class::{Class, ClassType, Color},
    field_value::FieldValue,
    grade::Grade,
    ids::*,
    rubric::{Assignment, Rubric},
    scale::{GradePercentage, GradeScale, ScaleType},
    semester::Semester,
};

use crate::error::StorageError;
use crate::live::LiveRegistry;
use crate::traits::{
    ClassField, CompareOp, DiffCallback, EntityRef, LiveResults, Predicate, Store,
    SubscriptionToken, Transaction,
};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn encode_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_date(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("invalid assignment date `{text}`: {e}")))
}

pub struct SqliteStore {
    conn: Connection,
    live: LiveRegistry,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            live: LiveRegistry::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            live: LiveRegistry::new(),
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn subscription_count(&self) -> usize {
        self.live.subscription_count()
    }
}

struct SqliteTransaction<'conn> {
    tx: rusqlite::Transaction<'conn>,
    touched: BTreeSet<ClassId>,
}

impl SqliteTransaction<'_> {
    /// Class owning a child row, or NotFound.
    fn owner_of(&self, table: &str, id_column: &str, id: &[u8; 16]) -> Result<ClassId, StorageError> {
        let sql = format!("SELECT class_id FROM {table} WHERE {id_column} = ?1");
        let bytes: Option<Vec<u8>> = self
            .tx
            .query_row(&sql, rusqlite::params![id.as_slice()], |row| row.get(0))
            .optional()?;
        match bytes {
            Some(bytes) => Ok(ClassId::from_bytes(to_array::<16>(bytes, "class_id")?)),
            None => Err(StorageError::NotFound(format!(
                "{table} row {}",
                uuid::Uuid::from_bytes(*id)
            ))),
        }
    }

    fn require_changed(changed: usize, what: impl FnOnce() -> String) -> Result<(), StorageError> {
        if changed == 0 {
            return Err(StorageError::NotFound(what()));
        }
        Ok(())
    }

    /// An assignment's rubric must belong to the assignment's class.
    fn check_rubric_owner(&self, assignment: &Assignment) -> Result<(), StorageError> {
        if let Some(rubric_id) = assignment.rubric_id {
            let owner = self.owner_of("rubrics", "rubric_id", rubric_id.as_bytes())?;
            if owner != assignment.class_id {
                return Err(StorageError::ConstraintViolation(format!(
                    "assignment {} references rubric {rubric_id} of another class",
                    assignment.id
                )));
            }
        }
        Ok(())
    }

    fn write_rubric(&self, class_id: ClassId, rubric: &Rubric, position: i64) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO rubrics (rubric_id, class_id, position, name, weight) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                rubric.id.as_bytes().as_slice(),
                class_id.as_bytes().as_slice(),
                position,
                rubric.name,
                rubric.weight,
            ],
        )?;
        Ok(())
    }

    fn write_assignment(&self, assignment: &Assignment) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO assignments (assignment_id, class_id, rubric_id, name, date, score) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                assignment.id.as_bytes().as_slice(),
                assignment.class_id.as_bytes().as_slice(),
                assignment.rubric_id.map(|r| r.as_bytes().to_vec()),
                assignment.name,
                encode_date(&assignment.date),
                assignment.score,
            ],
        )?;
        Ok(())
    }
}

fn map_collision(e: rusqlite::Error, what: impl FnOnce() -> String) -> StorageError {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(what())
        }
        other => StorageError::Sqlite(other),
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn insert_class(&mut self, class: &Class) -> Result<i64, StorageError> {
        let sort_key = match class.sort_key {
            Some(key) => {
                self.tx
                    .execute("INSERT OR IGNORE INTO sort_keys (sort_key) VALUES (?1)", [key])?;
                key
            }
            None => {
                self.tx.execute("INSERT INTO sort_keys DEFAULT VALUES", [])?;
                self.tx.last_insert_rowid()
            }
        };
        let color = class.color.to_msgpack()?;
        self.tx
            .execute(
                "INSERT INTO classes (class_id, name, class_type, credit_hours, is_favorite, color, sort_key) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    class.id.as_bytes().as_slice(),
                    class.name,
                    class.class_type.as_str(),
                    class.credit_hours,
                    class.is_favorite,
                    color,
                    sort_key,
                ],
            )
            .map_err(|e| map_collision(e, || format!("class {} or sort key {sort_key} already stored", class.id)))?;

        self.tx.execute(
            "INSERT INTO semesters (semester_id, class_id, term, year) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                class.semester_id.as_bytes().as_slice(),
                class.id.as_bytes().as_slice(),
                class.semester.term,
                class.semester.year,
            ],
        )?;
        self.tx.execute(
            "INSERT INTO grades (grade_id, class_id, score, letter) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                class.grade.id.as_bytes().as_slice(),
                class.id.as_bytes().as_slice(),
                class.grade.score,
                class.grade.letter,
            ],
        )?;

        for (position, rubric) in class.rubrics.iter().enumerate() {
            self.write_rubric(class.id, rubric, position as i64)?;
        }
        for assignment in &class.assignments {
            if assignment.class_id != class.id {
                return Err(StorageError::ConstraintViolation(format!(
                    "assignment {} belongs to class {}, not {}",
                    assignment.id, assignment.class_id, class.id
                )));
            }
            if let Some(rubric_id) = assignment.rubric_id
                && class.rubric(rubric_id).is_none()
            {
                return Err(StorageError::ConstraintViolation(format!(
                    "assignment {} references rubric {rubric_id} outside class {}",
                    assignment.id, class.id
                )));
            }
            self.write_assignment(assignment)?;
        }

        self.touched.insert(class.id);
        Ok(sort_key)
    }

    fn delete(&mut self, entity: EntityRef) -> Result<(), StorageError> {
        let (table, column, id, owner) = match entity {
            EntityRef::Class(id) => ("classes", "class_id", *id.as_bytes(), id),
            EntityRef::Rubric(id) => {
                let owner = self.owner_of("rubrics", "rubric_id", id.as_bytes())?;
                ("rubrics", "rubric_id", *id.as_bytes(), owner)
            }
            EntityRef::Assignment(id) => {
                let owner = self.owner_of("assignments", "assignment_id", id.as_bytes())?;
                ("assignments", "assignment_id", *id.as_bytes(), owner)
            }
            EntityRef::Semester(id) => {
                let owner = self.owner_of("semesters", "semester_id", id.as_bytes())?;
                ("semesters", "semester_id", *id.as_bytes(), owner)
            }
            EntityRef::Grade(id) => {
                let owner = self.owner_of("grades", "grade_id", id.as_bytes())?;
                ("grades", "grade_id", *id.as_bytes(), owner)
            }
        };
        let sql = format!("DELETE FROM {table} WHERE {column} = ?1");
        let changed = self.tx.execute(&sql, rusqlite::params![id.as_slice()])?;
        Self::require_changed(changed, || format!("{entity:?}"))?;
        self.touched.insert(owner);
        Ok(())
    }

    fn update_grade(&mut self, class_id: ClassId, score: f64, letter: &str) -> Result<(), StorageError> {
        let changed = self.tx.execute(
            "UPDATE grades SET score = ?1, letter = ?2 WHERE class_id = ?3",
            rusqlite::params![score, letter, class_id.as_bytes().as_slice()],
        )?;
        Self::require_changed(changed, || format!("grade of class {class_id}"))?;
        self.touched.insert(class_id);
        Ok(())
    }

    fn set_favorite(&mut self, class_id: ClassId, is_favorite: bool) -> Result<(), StorageError> {
        let changed = self.tx.execute(
            "UPDATE classes SET is_favorite = ?1 WHERE class_id = ?2",
            rusqlite::params![is_favorite, class_id.as_bytes().as_slice()],
        )?;
        Self::require_changed(changed, || format!("class {class_id}"))?;
        self.touched.insert(class_id);
        Ok(())
    }

    fn update_class_details(
        &mut self,
        class_id: ClassId,
        name: &str,
        class_type: ClassType,
        credit_hours: u32,
    ) -> Result<(), StorageError> {
        let changed = self.tx.execute(
            "UPDATE classes SET name = ?1, class_type = ?2, credit_hours = ?3 WHERE class_id = ?4",
            rusqlite::params![name, class_type.as_str(), credit_hours, class_id.as_bytes().as_slice()],
        )?;
        Self::require_changed(changed, || format!("class {class_id}"))?;
        self.touched.insert(class_id);
        Ok(())
    }

    fn set_semester(&mut self, class_id: ClassId, semester: &Semester) -> Result<(), StorageError> {
        let changed = self.tx.execute(
            "UPDATE semesters SET term = ?1, year = ?2 WHERE class_id = ?3",
            rusqlite::params![semester.term, semester.year, class_id.as_bytes().as_slice()],
        )?;
        Self::require_changed(changed, || format!("semester of class {class_id}"))?;
        self.touched.insert(class_id);
        Ok(())
    }

    fn insert_rubric(&mut self, class_id: ClassId, rubric: &Rubric) -> Result<(), StorageError> {
        let position: i64 = self.tx.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM rubrics WHERE class_id = ?1",
            rusqlite::params![class_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        self.write_rubric(class_id, rubric, position)
            .map_err(|e| match e {
                StorageError::Sqlite(sq) => map_collision(sq, || format!("rubric {} for class {class_id}", rubric.id)),
                other => other,
            })?;
        self.touched.insert(class_id);
        Ok(())
    }

    fn update_rubric(&mut self, rubric: &Rubric) -> Result<(), StorageError> {
        let owner = self.owner_of("rubrics", "rubric_id", rubric.id.as_bytes())?;
        self.tx.execute(
            "UPDATE rubrics SET name = ?1, weight = ?2 WHERE rubric_id = ?3",
            rusqlite::params![rubric.name, rubric.weight, rubric.id.as_bytes().as_slice()],
        )?;
        self.touched.insert(owner);
        Ok(())
    }

    fn insert_assignment(&mut self, assignment: &Assignment) -> Result<(), StorageError> {
        self.check_rubric_owner(assignment)?;
        self.write_assignment(assignment).map_err(|e| match e {
            StorageError::Sqlite(sq) => map_collision(sq, || format!("assignment {}", assignment.id)),
            other => other,
        })?;
        self.touched.insert(assignment.class_id);
        Ok(())
    }

    fn update_assignment(&mut self, assignment: &Assignment) -> Result<(), StorageError> {
        self.check_rubric_owner(assignment)?;
        let changed = self.tx.execute(
            "UPDATE assignments SET rubric_id = ?1, name = ?2, date = ?3, score = ?4 WHERE assignment_id = ?5 AND class_id = ?6",
            rusqlite::params![
                assignment.rubric_id.map(|r| r.as_bytes().to_vec()),
                assignment.name,
                encode_date(&assignment.date),
                assignment.score,
                assignment.id.as_bytes().as_slice(),
                assignment.class_id.as_bytes().as_slice(),
            ],
        )?;
        Self::require_changed(changed, || format!("assignment {}", assignment.id))?;
        self.touched.insert(assignment.class_id);
        Ok(())
    }

    fn replace_grade_scale(&mut self, scale: &GradeScale) -> Result<(), StorageError> {
        self.tx.execute("DELETE FROM grade_percentages", [])?;
        self.tx.execute("DELETE FROM grade_scale", [])?;
        self.tx.execute(
            "INSERT INTO grade_scale (scale_key, scale_type) VALUES (?1, ?2)",
            rusqlite::params![GRADE_SCALE_KEY, scale.scale_type().as_str()],
        )?;
        for (position, p) in scale.percentages().iter().enumerate() {
            self.tx.execute(
                "INSERT INTO grade_percentages (scale_key, position, letter, lower_bound, upper_bound) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![GRADE_SCALE_KEY, position as i64, p.letter, p.lower_bound, p.upper_bound],
            )?;
        }
        Ok(())
    }
}

fn column(field: ClassField) -> &'static str {
    match field {
        ClassField::SemesterTerm => "s.term",
        ClassField::SemesterYear => "s.year",
        ClassField::IsFavorite => "c.is_favorite",
        ClassField::Name => "c.name",
        ClassField::ClassType => "c.class_type",
        ClassField::CreditHours => "c.credit_hours",
    }
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Integer(n) => Value::Integer(*n),
        FieldValue::Float(f) => Value::Real(*f),
        FieldValue::Boolean(b) => Value::Integer(i64::from(*b)),
    }
}

/// Compile a predicate into a WHERE clause, appending its bound values.
fn compile_predicate(predicate: &Predicate, params: &mut Vec<Value>) -> String {
    match predicate {
        Predicate::All => "1 = 1".to_string(),
        Predicate::Filter(filter) => {
            let col = column(filter.field);
            if filter.value.is_null() {
                return match filter.op {
                    CompareOp::Eq => format!("{col} IS NULL"),
                    CompareOp::NotEq => format!("{col} IS NOT NULL"),
                    _ => "0 = 1".to_string(),
                };
            }
            params.push(to_sql_value(&filter.value));
            format!("{col} {} ?{}", filter.op.as_sql(), params.len())
        }
        Predicate::And(parts) if parts.is_empty() => "1 = 1".to_string(),
        Predicate::And(parts) => {
            let clauses: Vec<String> = parts.iter().map(|p| compile_predicate(p, params)).collect();
            format!("({})", clauses.join(" AND "))
        }
    }
}

fn find_class_ids(conn: &Connection, predicate: &Predicate) -> Result<Vec<ClassId>, StorageError> {
    let mut params = Vec::new();
    let clause = compile_predicate(predicate, &mut params);
    let sql = format!(
        "SELECT c.class_id FROM classes c LEFT JOIN semesters s ON s.class_id = c.class_id WHERE {clause} ORDER BY c.sort_key"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, Vec<u8>>(0))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(ClassId::from_bytes(to_array::<16>(row?, "class_id")?));
    }
    Ok(result)
}

type ClassRow = (
    String,
    String,
    u32,
    bool,
    Vec<u8>,
    i64,
    Vec<u8>,
    String,
    i32,
    Vec<u8>,
    f64,
    String,
);

impl SqliteStore {
    fn load_rubrics(&self, class_id: ClassId) -> Result<Vec<Rubric>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT rubric_id, name, weight FROM rubrics WHERE class_id = ?1 ORDER BY position")?;
        let rows = stmt.query_map(rusqlite::params![class_id.as_bytes().as_slice()], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id_bytes, name, weight) = row?;
            result.push(Rubric {
                id: RubricId::from_bytes(to_array::<16>(id_bytes, "rubric_id")?),
                name,
                weight,
            });
        }
        Ok(result)
    }

    fn load_assignments(&self, class_id: ClassId) -> Result<Vec<Assignment>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT assignment_id, rubric_id, name, date, score FROM assignments WHERE class_id = ?1 ORDER BY date, rowid",
        )?;
        let rows = stmt.query_map(rusqlite::params![class_id.as_bytes().as_slice()], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Option<Vec<u8>>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id_bytes, rubric_bytes, name, date, score) = row?;
            let rubric_id = match rubric_bytes {
                Some(bytes) => Some(RubricId::from_bytes(to_array::<16>(bytes, "rubric_id")?)),
                None => None,
            };
            result.push(Assignment {
                id: AssignmentId::from_bytes(to_array::<16>(id_bytes, "assignment_id")?),
                class_id,
                rubric_id,
                name,
                date: decode_date(&date)?,
                score,
            });
        }
        Ok(result)
    }
}

impl Store for SqliteStore {
    fn write<T, F>(&mut self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, StorageError>,
    {
        let mut txn = SqliteTransaction {
            tx: self.conn.transaction()?,
            touched: BTreeSet::new(),
        };
        // Dropping the transaction on error rolls it back.
        let value = f(&mut txn)?;
        let SqliteTransaction { tx, touched } = txn;
        tx.commit()?;
        self.live.mark_touched(touched);
        Ok(value)
    }

    fn get_class(&self, class_id: ClassId) -> Result<Option<Class>, StorageError> {
        let row: Option<ClassRow> = self
            .conn
            .query_row(
                "SELECT c.name, c.class_type, c.credit_hours, c.is_favorite, c.color, c.sort_key,
                        s.semester_id, s.term, s.year, g.grade_id, g.score, g.letter
                 FROM classes c
                 JOIN semesters s ON s.class_id = c.class_id
                 JOIN grades g ON g.class_id = c.class_id
                 WHERE c.class_id = ?1",
                rusqlite::params![class_id.as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                        row.get(11)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            name,
            class_type,
            credit_hours,
            is_favorite,
            color,
            sort_key,
            semester_id,
            term,
            year,
            grade_id,
            score,
            letter,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(Class {
            id: class_id,
            name,
            class_type: ClassType::parse(&class_type)?,
            credit_hours,
            semester_id: SemesterId::from_bytes(to_array::<16>(semester_id, "semester_id")?),
            semester: Semester::new(term, year),
            grade: Grade {
                id: GradeId::from_bytes(to_array::<16>(grade_id, "grade_id")?),
                score,
                letter,
            },
            is_favorite,
            color: Color::from_msgpack(&color)?,
            rubrics: self.load_rubrics(class_id)?,
            assignments: self.load_assignments(class_id)?,
            sort_key: Some(sort_key),
        }))
    }

    fn find_classes(&self, predicate: &Predicate) -> Result<Vec<ClassId>, StorageError> {
        find_class_ids(&self.conn, predicate)
    }

    fn class_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM classes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn get_grade_scale(&self) -> Result<Option<GradeScale>, StorageError> {
        let scale_type: Option<String> = self
            .conn
            .query_row(
                "SELECT scale_type FROM grade_scale WHERE scale_key = ?1",
                rusqlite::params![GRADE_SCALE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let Some(scale_type) = scale_type else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT letter, lower_bound, upper_bound FROM grade_percentages WHERE scale_key = ?1 ORDER BY position",
        )?;
        let percentages = stmt
            .query_map(rusqlite::params![GRADE_SCALE_KEY], |row| {
                Ok(GradePercentage::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(GradeScale::from_ranges(ScaleType::parse(&scale_type)?, percentages)?))
    }

    fn query(&mut self, predicate: Predicate) -> Result<LiveResults, StorageError> {
        let rows = find_class_ids(&self.conn, &predicate)?;
        Ok(self.live.register(predicate, rows))
    }

    fn results(&self, handle: &LiveResults) -> Result<Vec<ClassId>, StorageError> {
        self.live.rows(handle.query_id).map(|rows| rows.to_vec())
    }

    fn release(&mut self, handle: &LiveResults) {
        self.live.release(handle.query_id);
    }

    fn subscribe(
        &mut self,
        handle: &LiveResults,
        callback: DiffCallback,
    ) -> Result<SubscriptionToken, StorageError> {
        self.live.subscribe(handle.query_id, callback)
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.live.unsubscribe(token)
    }

    fn deliver_notifications(&mut self) -> usize {
        let conn = &self.conn;
        self.live.deliver(|predicate| find_class_ids(conn, predicate))
    }
}
