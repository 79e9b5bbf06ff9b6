//! Query-string shapes and their conversion into service inputs.
//!
//! Every field arrives as an optional string. Blank values count as absent;
//! malformed numbers are a 400, never a silently ignored filter.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use domains::{CategoryNames, ListingSort, ListingStatus, PageRequest, ReviewId};
use services::{CategorySelector, ListingQuery};

use crate::error::{ApiError, ApiResult};
use crate::state::ApiLimits;

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse<T: FromStr>(name: &str, value: Option<String>) -> ApiResult<Option<T>> {
    present(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| ApiError::bad_request(format!("invalid {name} '{v}'")))
        })
        .transpose()
}

fn selector(
    category_id: Option<String>,
    main: Option<String>,
    sub: Option<String>,
    sub_sub: Option<String>,
) -> ApiResult<CategorySelector> {
    if let Some(id) = parse("categoryId", category_id)? {
        return Ok(CategorySelector::Id(id));
    }
    let sub = present(sub);
    let sub_sub = present(sub_sub);
    match present(main) {
        Some(main) => Ok(CategorySelector::Names(CategoryNames::new(
            &main,
            sub.as_deref(),
            sub_sub.as_deref(),
        )?)),
        None if sub.is_some() || sub_sub.is_some() => Err(ApiError::bad_request(
            "subCategory requires mainCategory",
        )),
        None => Ok(CategorySelector::Any),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingParams {
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub sub_sub_category: Option<String>,
    pub category_id: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    /// `active` when absent; `all` lifts the restriction.
    pub status: Option<String>,
}

impl ListingParams {
    pub fn into_query(self, limits: &ApiLimits) -> ApiResult<(ListingQuery, PageRequest)> {
        let page = parse("page", self.page)?.unwrap_or(1);
        let page_size = parse::<u32>("pageSize", self.page_size)?
            .unwrap_or(limits.default_page_size)
            .min(limits.max_page_size);
        let page = PageRequest::new(page, page_size)?;

        let status = match present(self.status).as_deref() {
            None => Some(ListingStatus::Active),
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<ListingStatus>()?),
        };
        let sort = match present(self.sort) {
            Some(s) => s.parse::<ListingSort>()?,
            None => ListingSort::default(),
        };

        let query = ListingQuery {
            category: selector(
                self.category_id,
                self.main_category,
                self.sub_category,
                self.sub_sub_category,
            )?,
            search: present(self.search),
            location: present(self.location),
            min_price: parse::<Decimal>("minPrice", self.min_price)?,
            max_price: parse::<Decimal>("maxPrice", self.max_price)?,
            status,
            sort,
        };
        Ok((query, page))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub sub_sub_category: Option<String>,
}

impl SearchParams {
    pub fn into_parts(self) -> ApiResult<(String, CategorySelector)> {
        let term = present(self.q).unwrap_or_default();
        let category = selector(
            None,
            self.main_category,
            self.sub_category,
            self.sub_sub_category,
        )?;
        Ok((term, category))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CursorParams {
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

impl CursorParams {
    pub fn into_parts(self) -> ApiResult<(Option<ReviewId>, Option<u32>)> {
        Ok((parse("cursor", self.cursor)?, parse("limit", self.limit)?))
    }
}
