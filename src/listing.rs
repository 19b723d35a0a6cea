use serde::{Deserialize, Serialize};

pub const PAGE_SIZE: i64 = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    TitleAsc,
    TitleDesc,
    AuthorAsc,
    AuthorDesc,
}

impl SortOrder {
    // unknown and missing keys fall back to ascending titles.
    pub fn parse(key: Option<&str>) -> Self {
        match key {
            Some("title_desc") => SortOrder::TitleDesc,
            Some("author_asc") | Some("Author") => SortOrder::AuthorAsc,
            Some("author_desc") => SortOrder::AuthorDesc,
            _ => SortOrder::TitleAsc,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            SortOrder::TitleAsc => "",
            SortOrder::TitleDesc => "title_desc",
            SortOrder::AuthorAsc => "author_asc",
            SortOrder::AuthorDesc => "author_desc",
        }
    }

    // the key a click on the title column header should request next.
    pub fn title_toggle(&self) -> &'static str {
        match self {
            SortOrder::TitleAsc => SortOrder::TitleDesc.key(),
            _ => SortOrder::TitleAsc.key(),
        }
    }

    pub fn author_toggle(&self) -> &'static str {
        match self {
            SortOrder::AuthorAsc => SortOrder::AuthorDesc.key(),
            _ => SortOrder::AuthorAsc.key(),
        }
    }

    // the article id keeps the order stable between equal titles or authors.
    pub(crate) fn order_by_sql(&self) -> &'static str {
        match self {
            SortOrder::TitleAsc => "a.title ASC, a.id ASC",
            SortOrder::TitleDesc => "a.title DESC, a.id ASC",
            SortOrder::AuthorAsc => "u.full_name ASC, u.username ASC, a.id ASC",
            SortOrder::AuthorDesc => "u.full_name DESC, u.username DESC, a.id ASC",
        }
    }
}

/// The raw query string of the article list.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub sort_order: Option<String>,
    pub current_filter: Option<String>,
    pub search_string: Option<String>,
    pub page: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListParams {
    pub sort: SortOrder,
    pub filter: Option<String>,
    pub page: i64,
}

impl ListQuery {
    /// Resolves which filter and page the request is really asking for.
    ///
    /// A submitted `searchString` starts a new search from the first page.
    /// Without it, the filter carried over in `currentFilter` stays active
    /// and the requested page is kept.
    pub fn normalize(self) -> ListParams {
        let (filter, page) = match self.search_string {
            Some(search) => (search, 1),
            None => (
                self.current_filter.unwrap_or_default(),
                self.page.unwrap_or(1),
            ),
        };
        let filter = filter.trim();

        ListParams {
            sort: SortOrder::parse(self.sort_order.as_deref()),
            filter: (!filter.is_empty()).then(|| filter.to_string()),
            page,
        }
    }
}

// The number of rows to skip for `page`, `None` when the page can never hold rows.
pub fn page_offset(page: i64) -> Option<i64> {
    if page < 1 {
        return None;
    }
    (page - 1).checked_mul(PAGE_SIZE)
}

#[derive(Clone, Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page_number: i64,
    pub page_size: i64,
    pub page_count: i64,
    pub total_items: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, page_number: i64, total_items: i64) -> Self {
        let page_count = (total_items + PAGE_SIZE - 1) / PAGE_SIZE;
        Self {
            items,
            page_number,
            page_size: PAGE_SIZE,
            page_count,
            total_items,
            has_previous: page_number > 1,
            has_next: page_number < page_count,
        }
    }

    pub fn empty(page_number: i64, total_items: i64) -> Self {
        Self::new(vec![], page_number, total_items)
    }
}
