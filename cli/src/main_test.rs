#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn test_sanitize_path_allows_simple_relative() {
        let p = sanitize_path("foo/bar.irxb").expect("relative path should be allowed");
        assert_eq!(p, PathBuf::from("foo/bar.irxb"));
    }

    #[test]
    fn test_sanitize_path_rejects_parent_dir() {
        let err = sanitize_path("foo/../bar.irxb").unwrap_err();
        assert!(err.to_string().contains("Parent directory components"));
    }

    #[cfg(unix)]
    #[test]
    fn test_sanitize_path_allows_absolute_unix() {
        let p = sanitize_path("/tmp/a.irxb").expect("absolute path should be allowed");
        assert_eq!(p, PathBuf::from("/tmp/a.irxb"));
    }

    #[test]
    fn test_cli_args_rejects_parent_dir_in_run() {
        let err = CliArgs::try_parse_from(["irx", "run", "foo/../bar.irxb"]).unwrap_err();
        assert!(err.to_string().contains("Parent directory components"));
    }

    #[test]
    fn test_cli_args_accepts_simple_file() {
        let args = CliArgs::try_parse_from(["irx", "a.irxb"]).expect("should parse");
        assert!(args.command.is_none());
        assert_eq!(args.file.as_deref(), Some(Path::new("a.irxb")));
    }

    #[test]
    fn test_cli_args_run_flags() {
        let args = CliArgs::try_parse_from(["irx", "run", "a.irxb", "--opt", "--stats", "--dump-after", "dead-code"])
            .expect("should parse");
        match args.command {
            Some(Commands::Run {
                opt, stats, dump_after, ..
            }) => {
                assert!(opt);
                assert!(stats);
                assert_eq!(dump_after.as_deref(), Some("dead-code"));
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn test_env_toggle_and_filter() {
        assert!(env_toggle_enabled("1"));
        assert!(env_toggle_enabled("irx::interp=trace"));
        assert!(!env_toggle_enabled("off"));
        assert!(!env_toggle_enabled("  "));
        assert_eq!(filter_expr_from("true"), None);
        assert_eq!(filter_expr_from(" irx=debug "), Some("irx=debug".to_string()));
    }

    #[test]
    fn test_unknown_pass_is_rejected() {
        let mut module = IrModule::new(samples::find("arith").unwrap().build());
        let err = optimize(&mut module, &PassConfig::default(), Some("nope")).unwrap_err();
        assert!(err.to_string().contains("unknown pass 'nope'"));
        assert!(!module.flags.contains(ModuleFlags::OPTIMIZED));
    }

    #[test]
    fn test_scope_report_nests_bodies() {
        let root = samples::find("blocks").unwrap().build();
        let report = ScopeReport::new(&root);
        assert_eq!(report.kind, "script");
        assert!(report.nested.iter().any(|s| s.name == "each_twice"));
        let mut text = String::new();
        report.write_text(&mut text, 0);
        assert!(text.starts_with("script <main>: "));
        assert!(text.contains("\n  method each_twice: "));
    }
}
