//! Shared fixtures: an in-memory register site and page builders

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use medreg_scraper::infrastructure::{FetchAttemptError, PageSource, RetryPolicy};

type Reply = Result<String, FetchAttemptError>;

/// Per-URL scripted replies. The last reply of a URL repeats; unknown URLs get 404.
#[derive(Default)]
pub struct ScriptedSite {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: String) -> Self {
        self.script(url, vec![Ok(body)])
    }

    pub fn script(self, url: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PageSource for ScriptedSite {
    async fn fetch_once(&self, url: &str) -> Result<String, FetchAttemptError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        tokio::task::yield_now().await;

        let mut routes = self.routes.lock().unwrap();
        let Some(replies) = routes.get_mut(url) else {
            return Err(FetchAttemptError::Status(404));
        };
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap()
        }
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 5,
        backoff_base: Duration::from_millis(2),
        jitter: Duration::from_millis(1),
        retryable_statuses: vec![429, 500, 520],
    }
}

/// Listing page: nine boilerplate rows, the given rows, pagination footer
pub fn overview_page(rows: &[String]) -> String {
    let header: String = (0..9)
        .map(|i| format!("<tr><td>boilerplate {i}</td></tr>"))
        .collect();
    format!(
        "<html><body><table>{header}{}<tr><td></td></tr>\
         <tr><td>« Previous 1 2 3 Next »</td></tr></table>\
         <table><tr><td>M99999</td></tr></table></body></html>",
        rows.concat()
    )
}

pub fn record_row(reg: &str, name: &str, address: &str, nature: &str, year: &str) -> String {
    format!(
        "<tr><td>{reg}</td><td>{name}</td><td></td><td></td><td>{address}</td>\
         <td>{nature}</td><td></td><td>{year}</td></tr>"
    )
}

pub fn continuation_row(nature: &str, year: &str) -> String {
    format!("<tr><td>{nature}</td><td></td><td>{year}</td></tr>")
}

pub fn labelled(label: &str, cells: &[&str]) -> String {
    let values: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
    format!("<tr><td>{label}</td>{values}</tr>")
}

/// Detail page for a general practitioner
pub fn detail_page(reg: &str, name: &str, address: &str) -> String {
    detail_page_with(&[
        labelled("姓名Name", &[name]),
        labelled("註冊地址Registered Address*", &[address]),
        labelled("註冊編號Registration No.", &[reg]),
        labelled(
            "資格性質及年份Nature of Qualification and Year",
            &["香港大學內外全科醫學士MB BS (HK)", "2001"],
        ),
    ])
}

pub fn detail_page_with(rows: &[String]) -> String {
    format!(
        "<html><body><table>{}<tr><td></td></tr>\
         <tr><td>* A registered medical practitioner shall ...</td></tr>\
         <tr><td>註冊編號Registration No.</td><td>IGNORED</td></tr></table></body></html>",
        rows.concat()
    )
}
