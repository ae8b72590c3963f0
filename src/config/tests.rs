use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.storage.root.is_absolute());
    assert!(settings.storage.root.ends_with(DEFAULT_STORAGE_ROOT));
    assert_eq!(settings.storage.public_base_prefix, "/content");
    assert_eq!(settings.ingest.archive_extension, "zip");
    assert_eq!(settings.ingest.entry_documents, vec!["index.md", "index.mdx"]);
    assert_eq!(
        settings.ingest.max_archive_bytes.get(),
        DEFAULT_MAX_ARCHIVE_BYTES
    );
    assert_eq!(settings.ingest.max_entries.get(), 10_000);
    assert!(settings.ingest.workspace_dir.is_none());
}

#[test]
fn default_ingest_settings_match_loaded_defaults() {
    let loaded = Settings::from_raw(RawSettings::default())
        .expect("valid settings")
        .ingest;
    let default = IngestSettings::default();

    assert_eq!(loaded.archive_extension, default.archive_extension);
    assert_eq!(loaded.entry_documents, default.entry_documents);
    assert_eq!(loaded.max_archive_bytes, default.max_archive_bytes);
    assert_eq!(loaded.max_extracted_bytes, default.max_extracted_bytes);
    assert_eq!(loaded.max_entries, default.max_entries);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.storage.public_base_prefix = Some("/from-file".to_string());

    let overrides = GlobalOverrides {
        log_level: Some("debug".to_string()),
        log_json: Some(true),
        storage_root: Some(PathBuf::from("/srv/blog")),
        public_base_prefix: Some("/media/".to_string()),
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(settings.storage.root, PathBuf::from("/srv/blog"));
    assert_eq!(settings.storage.public_base_prefix, "/media");
}

#[test]
fn relative_storage_root_is_made_absolute_without_creating_it() {
    let mut raw = RawSettings::default();
    raw.storage.root = Some(PathBuf::from("folio-unused-root/blog"));

    let settings = Settings::from_raw(raw).expect("valid settings");

    let expected = std::env::current_dir()
        .expect("cwd")
        .join("folio-unused-root/blog");
    assert_eq!(settings.storage.root, expected);
    assert!(!settings.storage.root.exists());
}

#[test]
fn public_prefix_is_normalized() {
    assert_eq!(normalize_public_prefix("content").as_deref(), Ok("/content"));
    assert_eq!(normalize_public_prefix("//a/b//").as_deref(), Ok("/a/b"));
    assert_eq!(normalize_public_prefix("/").as_deref(), Ok(""));
    assert!(normalize_public_prefix("/x?y").is_err());
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let error = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn ingest_limits_must_be_positive() {
    let mut raw = RawSettings::default();
    raw.ingest.max_extracted_bytes = Some(0);

    let error = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "ingest.max_extracted_bytes",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.ingest.max_entries = Some(u64::from(u32::MAX) + 1);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn entry_documents_must_be_plain_names() {
    let mut raw = RawSettings::default();
    raw.ingest.entry_documents = Some(vec!["docs/index.md".to_string()]);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.ingest.entry_documents = Some(Vec::new());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.ingest.entry_documents = Some(vec![" README.md ".to_string()]);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.ingest.entry_documents, vec!["README.md"]);
}

#[test]
fn archive_extension_is_normalized() {
    let mut raw = RawSettings::default();
    raw.ingest.archive_extension = Some(".ZIP".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.ingest.archive_extension, "zip");

    let mut raw = RawSettings::default();
    raw.ingest.archive_extension = Some("tar.gz".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn parse_ingest_arguments() {
    let args = CliArgs::parse_from([
        "folio",
        "ingest",
        "/tmp/post.zip",
        "--slug",
        "hello",
        "--storage-root",
        "/srv/blog",
    ]);

    assert_eq!(
        args.overrides.storage_root.as_deref(),
        Some(std::path::Path::new("/srv/blog"))
    );
    match args.command {
        Command::Ingest(ingest) => {
            assert_eq!(ingest.file, std::path::Path::new("/tmp/post.zip"));
            assert_eq!(ingest.slug.as_deref(), Some("hello"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_delete_and_list_arguments() {
    let args = CliArgs::parse_from(["folio", "--log-json", "true", "delete", "my-post"]);
    assert_eq!(args.overrides.log_json, Some(true));
    match args.command {
        Command::Delete(delete) => assert_eq!(delete.slug, "my-post"),
        _ => panic!("wrong command parsed"),
    }

    let args = CliArgs::parse_from(["folio", "list"]);
    assert!(matches!(args.command, Command::List));
}
