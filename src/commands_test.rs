// Command-line parsing tests

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    use crate::commands::{named_target, AddArgs, Cli, Commands};
    use crate::error::ExplorerError;

    fn parse_add(args: &[&str]) -> AddArgs {
        let cli = Cli::try_parse_from(["explorer", "add"].iter().chain(args)).unwrap();
        match cli.command {
            Commands::Add(args) => args,
            _ => panic!("Expected the add subcommand"),
        }
    }

    #[test]
    fn test_name_with_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("paper.txt");
        fs::write(&file, "p").unwrap();
        let file_arg = file.to_string_lossy().to_string();

        let args = parse_add(&["1", &file_arg, "--name", "Final draft"]);
        let (path, name) = named_target(&args).unwrap().expect("a named target");
        assert_eq!(path, file.as_path());
        assert_eq!(name, "Final draft");
    }

    #[test]
    fn test_without_name_nothing_is_targeted() {
        let args = parse_add(&["1", "/tmp/a.txt", "/tmp/b.txt"]);
        assert!(named_target(&args).unwrap().is_none());
    }

    #[test]
    fn test_name_with_several_paths_is_rejected() {
        let args = parse_add(&["1", "/tmp/a.txt", "/tmp/b.txt", "--name", "Both"]);
        match named_target(&args) {
            Err(ExplorerError::PathInvalid { reason, .. }) => assert!(reason.contains("--name")),
            other => panic!("Expected PathInvalid, got {:?}", other),
        }
    }

    #[test]
    fn test_name_with_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let dir_arg = dir.path().to_string_lossy().to_string();

        let args = parse_add(&["1", &dir_arg, "--name", "Folder"]);
        match named_target(&args) {
            Err(ExplorerError::PathInvalid { path, .. }) => assert_eq!(path, dir.path()),
            other => panic!("Expected PathInvalid, got {:?}", other),
        }
    }
}
