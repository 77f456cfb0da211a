// Catalog service: books, students and attendants

use lendwise_core::{
    Attendant, Book, BookStatus, LendingError, LibraryStore, NewBook, NewPerson, Result, Student,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::library::{CreateBookRequest, CreatePersonRequest};

pub struct CatalogService {
    store: Arc<dyn LibraryStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    pub async fn create_book(&self, req: CreateBookRequest) -> Result<Book> {
        let title = required("title", req.title)?;
        let author = required("author", req.author)?;
        self.store
            .create_book(NewBook {
                title,
                author,
                status: req.status.unwrap_or(BookStatus::Available),
            })
            .await
    }

    pub async fn get_book(&self, id: Uuid) -> Result<Book> {
        self.store
            .get_book(id)
            .await?
            .ok_or_else(|| LendingError::not_found("Book", id))
    }

    pub async fn list_books(&self) -> Result<Vec<Book>> {
        self.store.list_books().await
    }

    /// Move a book on or off the shelf. Loans own the `borrowed` status.
    pub async fn update_book_status(&self, id: Uuid, status: BookStatus) -> Result<Book> {
        self.store.update_book_status(id, status).await
    }

    pub async fn create_student(&self, req: CreatePersonRequest) -> Result<Student> {
        let person = validate_person(req)?;
        self.store.create_student(person).await
    }

    pub async fn get_student(&self, id: Uuid) -> Result<Student> {
        self.store
            .get_student(id)
            .await?
            .ok_or_else(|| LendingError::not_found("Student", id))
    }

    pub async fn create_attendant(&self, req: CreatePersonRequest) -> Result<Attendant> {
        let person = validate_person(req)?;
        self.store.create_attendant(person).await
    }
}

fn required(field: &str, value: String) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(LendingError::validation(format!("{} is required", field)));
    }
    Ok(value)
}

fn validate_person(req: CreatePersonRequest) -> Result<NewPerson> {
    let email = req
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    if let Some(email) = &email {
        if !email.contains('@') {
            return Err(LendingError::validation(format!(
                "invalid email address: {}",
                email
            )));
        }
    }

    Ok(NewPerson {
        first_name: required("first_name", req.first_name)?,
        last_name: required("last_name", req.last_name)?,
        email,
    })
}
