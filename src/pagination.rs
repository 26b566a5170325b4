use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{cache::ListingKey, models::FieldError};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// SortField
///
/// Columns a topic listing may be ordered by, under their wire names. Anything else in the
/// `sort` parameter is rejected, which also keeps user input out of the ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Id,
    Title,
    Message,
    CreatedAt,
}

impl SortField {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "id" => Some(SortField::Id),
            "titulo" => Some(SortField::Title),
            "mensagem" => Some(SortField::Message),
            "dataCriacao" => Some(SortField::CreatedAt),
            _ => None,
        }
    }

    /// Column name in the `topics` table.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Title => "title",
            SortField::Message => "message",
            SortField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Pageable
///
/// Zero-based page request. Defaults to the first ten topics, newest id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pageable {
    pub page: u32,
    pub size: u32,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl Default for Pageable {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: SortField::Id,
            direction: SortDirection::Desc,
        }
    }
}

impl Pageable {
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

/// Page
///
/// One page of results plus the totals a client needs to navigate the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
    pub first: bool,
    pub last: bool,
    pub empty: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: &Pageable, total_elements: u64) -> Self {
        let size = u64::from(pageable.size.max(1));
        let total_pages = total_elements.div_ceil(size);
        Self {
            number: pageable.page,
            size: pageable.size,
            total_elements,
            total_pages,
            first: pageable.page == 0,
            last: u64::from(pageable.page) + 1 >= total_pages,
            empty: content.is_empty(),
            content,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
            empty: self.empty,
        }
    }
}

/// ListingParams
///
/// Query parameters accepted by `GET /topicos`. `sort` takes the form `field` or
/// `field,asc|desc`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListingParams {
    /// Only list topics filed under this course.
    #[serde(rename = "nomeCurso")]
    pub course_name: Option<String>,
    /// Zero-based page index.
    pub page: Option<u32>,
    /// Page size, 1 to 100.
    pub size: Option<u32>,
    /// e.g. `dataCriacao,asc`.
    pub sort: Option<String>,
}

impl ListingParams {
    /// into_key
    ///
    /// Validates the parameters and canonicalizes them into the key the listing cache and the
    /// repository share: blank course names collapse to no filter, omitted values take defaults.
    pub fn into_key(self) -> Result<ListingKey, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut pageable = Pageable::default();

        if let Some(page) = self.page {
            pageable.page = page;
        }

        if let Some(size) = self.size {
            if size == 0 || size > MAX_PAGE_SIZE {
                errors.push(FieldError::new(
                    "size",
                    format!("must be between 1 and {MAX_PAGE_SIZE}"),
                ));
            } else {
                pageable.size = size;
            }
        }

        if let Some(sort) = self.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let mut parts = sort.splitn(2, ',').map(str::trim);
            match parts.next().and_then(SortField::parse) {
                Some(field) => pageable.sort = field,
                None => errors.push(FieldError::new("sort", "unknown sort field")),
            }
            // An explicit field without a direction sorts ascending.
            pageable.direction = SortDirection::Asc;
            if let Some(direction) = parts.next() {
                match SortDirection::parse(direction) {
                    Some(direction) => pageable.direction = direction,
                    None => errors.push(FieldError::new("sort", "direction must be asc or desc")),
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let course_name = self
            .course_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(ListingKey {
            course_name,
            pageable,
        })
    }
}
