//! Checkpointed detail crawl against an in-memory register

mod common;

use common::{ScriptedSite, detail_page, detail_page_with, fast_policy, labelled};
use medreg_scraper::application::{CrawlPipeline, PipelineError, crawl_details};
use medreg_scraper::infrastructure::config::CrawlConfig;
use medreg_scraper::infrastructure::{Fetcher, ParsingConfig, StructuralError, json_store};
use medreg_scraper::{BilingualText, Practitioner, Qualification};

const TEMPLATE: &str = "https://register.test/detail?reg_no={registration_no}";
const FILE_NAME: &str = "scraped_doctors_detail.json";

fn url(reg: &str) -> String {
    format!("https://register.test/detail?reg_no={reg}")
}

fn overview(reg: &str, name: &str, address: &str) -> Practitioner {
    Practitioner::new(
        reg,
        BilingualText::new(name),
        BilingualText::new(address),
        Qualification::parse("MB BS (HK)", "2001").unwrap(),
    )
}

fn config(dir: &std::path::Path, batch_size: usize, resume: bool) -> CrawlConfig {
    CrawlConfig {
        detail_url_template: TEMPLATE.to_string(),
        detail_output_dir: dir.to_path_buf(),
        detail_file_name: FILE_NAME.to_string(),
        batch_size,
        resume,
        ..CrawlConfig::default()
    }
}

fn pipeline(site: ScriptedSite) -> CrawlPipeline<ScriptedSite> {
    CrawlPipeline::new(Fetcher::new(site, fast_policy()), 2, &ParsingConfig::default()).unwrap()
}

fn register() -> (Vec<Practitioner>, ScriptedSite) {
    let records = vec![
        overview("M00001", "Name A", "Addr A"),
        overview("M00002", "Name B", "Addr B"),
        overview("M00003", "Name C", "Addr C"),
    ];
    let site = ScriptedSite::new()
        .page(&url("M00001"), detail_page("M00001", "Name A", "Addr A"))
        .page(&url("M00002"), detail_page("M00002", "Name B (renamed)", "Addr B"))
        .page(&url("M00003"), detail_page("M00003", "Name C", "Addr C"));
    (records, site)
}

#[tokio::test]
async fn chunks_are_written_by_offset_and_mismatches_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let (records, site) = register();
    let pipeline = pipeline(site);

    let report = crawl_details(&pipeline, &records, &config(dir.path(), 2, false))
        .await
        .unwrap();

    let first_chunk = dir.path().join(format!("0_{FILE_NAME}"));
    let second_chunk = dir.path().join(format!("2_{FILE_NAME}"));
    assert_eq!(report.chunks_written, vec![first_chunk.clone(), second_chunk.clone()]);
    assert!(report.chunks_skipped.is_empty());
    assert_eq!(report.records_written, 2);
    assert_eq!(report.crawl.attempted, 3);

    assert_eq!(report.integrity_errors.len(), 1);
    let integrity = &report.integrity_errors[0];
    assert_eq!(integrity.url, url("M00002"));
    assert_eq!(integrity.field, "name");
    assert_eq!(integrity.detail, "Name B (renamed)");

    let first = json_store::load_practitioners(&first_chunk).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].registration_no, "M00001");
    assert_eq!(first[0].qualifications[0].year, 2001);

    let second = json_store::load_practitioners(&second_chunk).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].registration_no, "M00003");

    let chunks = json_store::chunk_files(dir.path(), FILE_NAME).await.unwrap();
    assert_eq!(chunks, vec![first_chunk, second_chunk]);
}

#[tokio::test]
async fn resume_skips_chunks_already_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (records, site) = register();
    let existing = dir.path().join(format!("0_{FILE_NAME}"));
    json_store::save_practitioners(&records[..2], &existing).await.unwrap();

    let pipeline = pipeline(site);
    let report = crawl_details(&pipeline, &records, &config(dir.path(), 2, true))
        .await
        .unwrap();

    assert_eq!(report.chunks_skipped, vec![existing.clone()]);
    assert_eq!(report.chunks_written.len(), 1);
    assert_eq!(report.records_written, 1);
    assert!(report.integrity_errors.is_empty());

    let site = pipeline.fetcher().source();
    assert_eq!(site.calls(&url("M00001")), 0);
    assert_eq!(site.calls(&url("M00002")), 0);
    assert_eq!(site.calls(&url("M00003")), 1);

    let untouched = json_store::load_practitioners(&existing).await.unwrap();
    assert_eq!(untouched, records[..2].to_vec());
}

#[tokio::test]
async fn without_resume_existing_chunks_are_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let (records, site) = register();
    json_store::save_practitioners(&[], &dir.path().join(format!("0_{FILE_NAME}")))
        .await
        .unwrap();

    let pipeline = pipeline(site);
    let report = crawl_details(&pipeline, &records, &config(dir.path(), 2, false))
        .await
        .unwrap();

    assert!(report.chunks_skipped.is_empty());
    assert_eq!(pipeline.fetcher().source().total_calls(), 3);
}

#[tokio::test]
async fn specialty_block_is_carried_into_the_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![overview("M00007", "黃醫生WONG, DOCTOR", "Addr W")];
    let page = detail_page_with(&[
        labelled("註冊編號Registration No.", &["M00007"]),
        labelled("姓名Name", &["黃醫生WONG, DOCTOR"]),
        labelled("註冊地址Registered Address*", &["Addr W"]),
        labelled(
            "資格性質及年份Nature of Qualification and Year",
            &["MB BS (HK)", "2001"],
        ),
        labelled("", &["FRCS (Edin)", "2006"]),
        labelled("註冊編號Registration No.", &["S01234"]),
        labelled("專科Specialty", &["心臟科Cardiology"]),
        labelled(
            "資格性質及年份Nature of Qualification and Year",
            &["FHKAM (Medicine)", "2009"],
        ),
    ]);
    let site = ScriptedSite::new().page(&url("M00007"), page);

    let report = crawl_details(&pipeline(site), &records, &config(dir.path(), 10, false))
        .await
        .unwrap();
    assert_eq!(report.records_written, 1);

    let saved = json_store::load_practitioners(&report.chunks_written[0]).await.unwrap();
    let doctor = &saved[0];
    assert_eq!(doctor.qualifications.len(), 2);
    assert_eq!(doctor.specialty_registration_no.as_deref(), Some("S01234"));
    assert_eq!(doctor.specialty_name.as_deref(), Some("心臟科Cardiology"));
    let specialty = doctor.speciality_qualification.as_ref().unwrap();
    assert_eq!(specialty.tag.as_deref(), Some("Medicine"));
    assert_eq!(specialty.year, 2009);
    assert!(doctor.has_specialty());
}

#[tokio::test]
async fn second_specialty_qualification_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![overview("M00008", "Name", "Addr")];
    let page = detail_page_with(&[
        labelled("註冊編號Registration No.", &["M00008"]),
        labelled("姓名Name", &["Name"]),
        labelled("註冊地址Registered Address*", &["Addr"]),
        labelled(
            "資格性質及年份Nature of Qualification and Year",
            &["MB BS (HK)", "2001"],
        ),
        labelled("註冊編號Registration No.", &["S00001"]),
        labelled("專科Specialty", &["Surgery"]),
        labelled(
            "資格性質及年份Nature of Qualification and Year",
            &["FRCS (Edin)", "2006"],
        ),
        labelled("", &["FHKAM (Surgery)", "2008"]),
    ]);
    let site = ScriptedSite::new().page(&url("M00008"), page);

    let error = crawl_details(&pipeline(site), &records, &config(dir.path(), 10, false))
        .await
        .unwrap_err();

    let PipelineError::Structural(structural) = error else {
        panic!("expected a structural error");
    };
    assert!(structural.to_string().contains(&url("M00008")));
    assert!(matches!(
        structural,
        StructuralError::OnPage { ref source, .. } if matches!(**source, StructuralError::MultipleSpecializations { .. })
    ));
    assert!(!dir.path().join(format!("0_{FILE_NAME}")).exists());
}

#[tokio::test]
async fn renamed_labels_fail_the_crawl_instead_of_dropping_records() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![overview("M00009", "Name", "Addr")];
    let page = detail_page_with(&[labelled("Full name", &["Name"]), labelled("Other", &["v"])]);
    let site = ScriptedSite::new().page(&url("M00009"), page);

    let error = crawl_details(&pipeline(site), &records, &config(dir.path(), 10, false))
        .await
        .unwrap_err();

    let PipelineError::Structural(StructuralError::OnPage { url: page_url, source }) = error else {
        panic!("expected a structural error with page context");
    };
    assert_eq!(page_url, url("M00009"));
    assert_eq!(*source, StructuralError::MissingField { field: "registration_no" });
    assert!(!dir.path().join(format!("0_{FILE_NAME}")).exists());
}
