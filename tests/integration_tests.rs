//! Integration tests for the school-feeds pipelines
//!
//! These tests drive each pipeline end to end against mock HTTP servers
//! and temporary directories.

mod common {
    use std::time::Duration;

    use school_feeds::fetcher::Fetcher;
    use tempfile::TempDir;

    /// Create a temporary directory for pipeline output
    pub fn create_temp_dir() -> TempDir {
        tempfile::tempdir().expect("Failed to create temp directory")
    }

    pub fn create_fetcher() -> Fetcher {
        Fetcher::new(Duration::from_secs(5)).expect("Failed to create fetcher")
    }

    pub const SCHOOL_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
            <channel>
                <title>율곡중학교 공지사항</title>
                <link>http://school.example.kr/</link>
                <item>
                    <title><![CDATA[2025학년도 2학기 방과후학교 수강 신청 안내]]></title>
                    <link>/yulgok-m/na/ntt/selectNttInfo.do?nttSn=1001</link>
                    <pubDate>Wed, 02 Jul 2025 23:17:42 GMT</pubDate>
                    <author><![CDATA[교무실]]></author>
                </item>
                <item>
                    <title>여름방학 중 학교시설 개방 안내</title>
                    <link>http://school.example.kr/yulgok-m/na/ntt/selectNttInfo.do?nttSn=1002</link>
                    <pubDate>Tue, 24 Jun 2025 10:30:00 +0900</pubDate>
                </item>
                <item>
                    <title>학부모 총회 개최</title>
                    <link></link>
                    <pubDate>2025-06-20 09:00:00</pubDate>
                    <author>행정실</author>
                </item>
            </channel>
        </rss>"#;
}

#[cfg(test)]
mod config_integration_tests {
    use school_feeds::config::Config;

    #[test]
    fn test_load_actual_school_config() {
        // Test loading the school.toml shipped with the project
        let config = Config::load("school.toml");
        assert!(config.is_ok(), "Failed to load school.toml: {:?}", config.err());

        let config = config.unwrap();
        assert!(!config.notices.is_empty(), "school.toml should list a notice feed");
        assert!(config.timeout_secs > 0, "timeout_secs should be positive");
        assert!(!config.meal.school_code.is_empty());
    }
}

#[cfg(test)]
mod notice_pipeline_tests {
    use super::common::*;
    use school_feeds::notice::crawl_notices;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_crawl_school_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/yulgok-m/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SCHOOL_RSS))
            .mount(&server)
            .await;

        let url = format!("{}/yulgok-m/rss", server.uri());
        let envelope = crawl_notices(&create_fetcher(), &url, Some("율곡중학교")).await;

        assert!(envelope.meta.error.is_none());
        assert_eq!(envelope.meta.total_count, 3);
        assert_eq!(envelope.notices.len(), envelope.meta.total_count);
        assert_eq!(envelope.meta.source, "율곡중학교");
        assert_eq!(envelope.meta.url, url);

        let first = &envelope.notices[0];
        assert_eq!(first.number, "1");
        assert_eq!(first.title, "2025학년도 2학기 방과후학교 수강 신청 안내");
        assert_eq!(first.author, "교무실");
        assert_eq!(first.date, "2025-07-02");
        assert_eq!(
            first.url,
            format!("{}/yulgok-m/na/ntt/selectNttInfo.do?nttSn=1001", server.uri())
        );

        let second = &envelope.notices[1];
        assert_eq!(second.date, "2025-06-24");
        assert_eq!(second.author, "");

        let third = &envelope.notices[2];
        assert_eq!(third.date, "2025-06-20");
        assert_eq!(third.url, "");
    }

    #[tokio::test]
    async fn test_site_name_defaults_to_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SCHOOL_RSS))
            .mount(&server)
            .await;

        let envelope = crawl_notices(&create_fetcher(), &server.uri(), None).await;

        let host = server.uri().trim_start_matches("http://").to_string();
        assert_eq!(envelope.meta.source, host);
    }

    #[tokio::test]
    async fn test_http_500_yields_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let envelope =
            crawl_notices(&create_fetcher(), &format!("{}/rss", server.uri()), None).await;

        assert!(envelope.notices.is_empty());
        assert_eq!(envelope.meta.total_count, 0);
        assert!(envelope.meta.error.is_some());
    }

    #[tokio::test]
    async fn test_malformed_xml_yields_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<rss><channel><item></channel></rss>"),
            )
            .mount(&server)
            .await;

        let envelope =
            crawl_notices(&create_fetcher(), &format!("{}/rss", server.uri()), None).await;

        assert!(envelope.notices.is_empty());
        assert_eq!(envelope.meta.total_count, 0);
        let error = envelope.meta.error.expect("error should be recorded");
        assert!(error.starts_with("RSS XML parse error"), "{error}");
    }

    #[tokio::test]
    async fn test_error_envelope_serializes_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let envelope =
            crawl_notices(&create_fetcher(), &format!("{}/rss", server.uri()), None).await;
        let value: serde_json::Value =
            serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(value["notices"], serde_json::json!([]));
        assert_eq!(value["meta"]["total_count"], 0);
        assert!(value["meta"]["error"].is_string());
    }
}

#[cfg(test)]
mod meal_pipeline_tests {
    use super::common::*;
    use chrono::NaiveDate;
    use school_feeds::config::{MealConfig, WeatherConfig};
    use school_feeds::meal::build_meal_page;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_weekend_run_renders_next_week() {
        let server = MockServer::start().await;
        let body = r#"{
            "mealServiceDietInfo": [
                {"head": [{"list_total_count": 2}]},
                {"row": [
                    {"MLSV_YMD": "20250714", "DDISH_NM": "쌀밥<br/>돈육김치찌개(5)(9)(10)<br/>우유(2)"},
                    {"MLSV_YMD": "20250715", "DDISH_NM": "잡곡밥<br/>미역국(5)(6)"}
                ]}
            ]
        }"#;
        Mock::given(method("GET"))
            .and(path("/hub/mealServiceDietInfo"))
            .and(query_param("MLSV_FROM_YMD", "20250714"))
            .and(query_param("MLSV_TO_YMD", "20250718"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = create_temp_dir();
        let meal = MealConfig {
            neis_base_url: format!("{}/hub", server.uri()),
            output: temp_dir.path().join("meal_info.html"),
            ..Default::default()
        };

        // Saturday
        let today = NaiveDate::from_ymd_opt(2025, 7, 12).unwrap();
        let written = build_meal_page(&create_fetcher(), &meal, &WeatherConfig::default(), today)
            .await
            .unwrap();

        let html = std::fs::read_to_string(written).unwrap();
        assert_eq!(html.matches(r#"<div class="meal-day-container">"#).count(), 2);
        assert!(html.contains("07월 14일 (월)"));
        assert!(html.contains("알레르기 유발 식품: 2, 5, 9, 10"));
        assert!(html.contains("알레르기 유발 식품: 5, 6"));
    }

    #[tokio::test]
    async fn test_failed_request_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let temp_dir = create_temp_dir();
        let meal = MealConfig {
            neis_base_url: server.uri(),
            output: temp_dir.path().join("meal_info.html"),
            ..Default::default()
        };

        let today = NaiveDate::from_ymd_opt(2025, 7, 16).unwrap();
        let result =
            build_meal_page(&create_fetcher(), &meal, &WeatherConfig::default(), today).await;

        assert!(result.is_err());
        assert!(!meal.output.exists());
    }
}

#[cfg(test)]
mod end_to_end_tests {
    use super::common::*;
    use school_feeds::config::FeedConfig;
    use school_feeds::feed::regenerate_feed;
    use school_feeds::notice::{crawl_notices, envelope_file_name};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_crawl_then_regenerate_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SCHOOL_RSS))
            .mount(&server)
            .await;

        let temp_dir = create_temp_dir();
        let url = format!("{}/rss", server.uri());

        // Crawl and save the envelope the way the CLI does
        let envelope = crawl_notices(&create_fetcher(), &url, Some("yulgok school")).await;
        let json_path = temp_dir.path().join(envelope_file_name(&envelope.meta.source));
        std::fs::write(&json_path, envelope.to_json().unwrap()).unwrap();

        // Regenerate in a separate step from the file alone
        let settings = FeedConfig {
            output_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let written = regenerate_feed(&json_path, None, None, &settings)
            .expect("feed should be generated");
        assert_eq!(written, temp_dir.path().join("yulgok_school_feed.xml"));

        let xml = std::fs::read(&written).unwrap();
        let parsed = feed_rs::parser::parse(&xml[..]).unwrap();

        assert_eq!(parsed.entries.len(), 3);
        assert!(parsed.entries.iter().all(|entry| !entry.id.is_empty()));
        // The notice without a URL gets a synthetic id under the feed URL
        assert_eq!(
            parsed.entries[2].id,
            format!("{}/notice/3-학부모-총회-개최", url)
        );
        assert_eq!(
            parsed.title.map(|t| t.content),
            Some("yulgok school 공지사항".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_crawl_still_regenerates_empty_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let temp_dir = create_temp_dir();
        let envelope =
            crawl_notices(&create_fetcher(), &format!("{}/rss", server.uri()), None).await;
        let json_path = temp_dir.path().join("failed_notices_api.json");
        std::fs::write(&json_path, envelope.to_json().unwrap()).unwrap();

        let output = temp_dir.path().join("failed.xml");
        let written = regenerate_feed(&json_path, Some(&output), None, &FeedConfig::default());

        assert_eq!(written, Some(output.clone()));
        let parsed = feed_rs::parser::parse(&std::fs::read(&output).unwrap()[..]).unwrap();
        assert!(parsed.entries.is_empty());
    }
}
