//! Integration tests for mirrorfs

mod pipeline_tests {
    use mirrorfs::config::MirrorConfig;
    use mirrorfs::mirror::sidecar::sidecar_path;
    #[cfg(unix)]
    use mirrorfs::mirror::sidecar::{ETAG_ATTRIBUTE, SHA256_ATTRIBUTE};
    use mirrorfs::mirror::{
        ContentDigest, Disposition, Handler, Mirror, MirrorOutcome, Placeholders, ResponseWriter,
        Skip, StreamResponse,
    };
    use mirrorfs::{MirrorError, MirrorResult};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use ureq::http::header::{CONTENT_LENGTH, ETAG};
    use ureq::http::{HeaderValue, Request, StatusCode};

    /// Upstream that answers every request with the same response
    struct Scripted {
        status: StatusCode,
        etag: Option<&'static str>,
        declared_length: Option<usize>,
        body: &'static [u8],
        chunk: usize,
    }

    impl Scripted {
        fn ok(body: &'static [u8]) -> Self {
            Self {
                status: StatusCode::OK,
                etag: None,
                declared_length: Some(body.len()),
                body,
                chunk: 2,
            }
        }

        fn status(mut self, status: StatusCode) -> Self {
            self.status = status;
            self
        }

        fn etag(mut self, etag: &'static str) -> Self {
            self.etag = Some(etag);
            self
        }

        fn declared_length(mut self, length: Option<usize>) -> Self {
            self.declared_length = length;
            self
        }
    }

    impl Handler for Scripted {
        fn serve(&self, _req: &Request<()>, w: &mut dyn ResponseWriter) -> MirrorResult<()> {
            if let Some(length) = self.declared_length {
                w.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
            if let Some(etag) = self.etag {
                w.headers_mut()
                    .insert(ETAG, HeaderValue::from_static(etag));
            }
            w.write_header(self.status);
            for chunk in self.body.chunks(self.chunk) {
                w.write(chunk)
                    .map_err(|e| MirrorError::io("writing body", e))?;
            }
            Ok(())
        }
    }

    fn mirror_at(root: &Path) -> Mirror {
        Mirror::new(MirrorConfig {
            root: root.display().to_string(),
            ..MirrorConfig::default()
        })
    }

    fn get(path: &str) -> Request<()> {
        Request::get(path).body(()).unwrap()
    }

    fn serve(
        mirror: &Mirror,
        req: &Request<()>,
        upstream: &dyn Handler,
    ) -> (MirrorResult<Disposition>, StreamResponse<Vec<u8>>) {
        let mut client = StreamResponse::new(Vec::new());
        let result = mirror.serve(req, &mut client, &Placeholders::new(), upstream);
        (result, client)
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn scenario_a_ok_response_is_mirrored() {
        let root = TempDir::new().unwrap();
        let mirror = mirror_at(root.path());

        let (result, client) = serve(&mirror, &get("/a.txt"), &Scripted::ok(b"hello"));

        assert!(matches!(
            result.unwrap(),
            Disposition::Mirrored { outcome: MirrorOutcome::Published, .. }
        ));
        assert_eq!(client.get_ref(), b"hello");
        assert_eq!(fs::read(root.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(entries(root.path()), vec!["a.txt"]);
    }

    #[test]
    fn scenario_b_not_found_is_not_mirrored() {
        let root = TempDir::new().unwrap();
        let mirror = mirror_at(root.path());
        let upstream = Scripted::ok(b"no such file").status(StatusCode::NOT_FOUND);

        let (result, client) = serve(&mirror, &get("/a.txt"), &upstream);

        assert!(matches!(
            result.unwrap(),
            Disposition::Mirrored { outcome: MirrorOutcome::Discarded, .. }
        ));
        assert_eq!(client.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(client.get_ref(), b"no such file");
        assert!(!root.path().join("a.txt").exists());
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn scenario_c_directory_request_passes_through() {
        let root = TempDir::new().unwrap();
        let mirror = mirror_at(root.path());

        let (result, client) = serve(&mirror, &get("/dir/"), &Scripted::ok(b"listing"));

        assert_eq!(
            result.unwrap(),
            Disposition::Passthrough(Skip::DirectoryRequest)
        );
        assert_eq!(client.get_ref(), b"listing");
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn scenario_d_directory_target_is_untouched() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("a.txt")).unwrap();
        fs::write(root.path().join("a.txt").join("inner"), b"keep").unwrap();
        let mirror = mirror_at(root.path());

        let (result, client) = serve(&mirror, &get("/a.txt"), &Scripted::ok(b"hello"));

        assert_eq!(
            result.unwrap(),
            Disposition::Passthrough(Skip::DirectoryTarget)
        );
        assert_eq!(client.get_ref(), b"hello");
        assert!(root.path().join("a.txt").is_dir());
        assert_eq!(entries(&root.path().join("a.txt")), vec!["inner"]);
        assert_eq!(entries(root.path()), vec!["a.txt"]);
    }

    #[test]
    fn scenario_e_etag_sidecar_holds_raw_header() {
        let root = TempDir::new().unwrap();
        let mirror = Mirror::new(MirrorConfig {
            root: root.path().display().to_string(),
            etag_file_suffix: ".etag".to_string(),
            ..MirrorConfig::default()
        });
        let upstream = Scripted::ok(b"hi").etag("\"abc123\"");

        let (result, _client) = serve(&mirror, &get("/a.txt"), &upstream);

        result.unwrap();
        assert_eq!(fs::read(root.path().join("a.txt")).unwrap(), b"hi");
        assert_eq!(
            fs::read(root.path().join("a.txt.etag")).unwrap(),
            b"\"abc123\""
        );
        assert_eq!(entries(root.path()), vec!["a.txt", "a.txt.etag"]);
    }

    #[test]
    fn digest_sidecar_matches_independent_hash() {
        let root = TempDir::new().unwrap();
        let mirror = Mirror::new(MirrorConfig {
            root: root.path().display().to_string(),
            sha256_file_suffix: ".sha256".to_string(),
            ..MirrorConfig::default()
        });
        let body: &'static [u8] = b"the quick brown fox jumps over the lazy dog";

        let (result, _client) = serve(&mirror, &get("/pub/fox.txt"), &Scripted::ok(body));

        result.unwrap();
        let target = root.path().join("pub").join("fox.txt");
        assert_eq!(
            fs::read_to_string(sidecar_path(&target, ".sha256")).unwrap(),
            ContentDigest::of(body).to_hex()
        );
    }

    #[test]
    fn truncated_body_leaves_previous_mirror() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), b"old").unwrap();
        let mirror = mirror_at(root.path());
        let upstream = Scripted::ok(b"hel").declared_length(Some(5));

        let (result, client) = serve(&mirror, &get("/a.txt"), &upstream);

        let Disposition::Mirrored {
            outcome,
            diagnostics,
            ..
        } = result.unwrap()
        else {
            panic!("expected a mirror attempt");
        };
        assert_eq!(outcome, MirrorOutcome::Discarded);
        assert_eq!(diagnostics, 1);
        assert_eq!(client.get_ref(), b"hel");
        assert_eq!(fs::read(root.path().join("a.txt")).unwrap(), b"old");
        assert_eq!(entries(root.path()), vec!["a.txt"]);
    }

    #[test]
    fn unknown_length_is_published_at_end_of_stream() {
        let root = TempDir::new().unwrap();
        let mirror = mirror_at(root.path());
        let upstream = Scripted::ok(b"streamed").declared_length(None);

        let (result, _client) = serve(&mirror, &get("/s.txt"), &upstream);

        result.unwrap();
        assert_eq!(fs::read(root.path().join("s.txt")).unwrap(), b"streamed");
    }

    #[test]
    fn existing_mirror_is_replaced() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), b"stale content").unwrap();
        let mirror = mirror_at(root.path());

        let (result, _client) = serve(&mirror, &get("/a.txt"), &Scripted::ok(b"fresh"));

        result.unwrap();
        assert_eq!(fs::read(root.path().join("a.txt")).unwrap(), b"fresh");
        assert_eq!(entries(root.path()), vec!["a.txt"]);
    }

    #[test]
    fn non_get_never_creates_files() {
        let root = TempDir::new().unwrap();
        let mirror = mirror_at(root.path());
        let req = Request::head("/a.txt").body(()).unwrap();

        let (result, _client) = serve(&mirror, &req, &Scripted::ok(b""));

        assert_eq!(result.unwrap(), Disposition::Passthrough(Skip::Method));
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn dot_segments_stay_under_root() {
        let root = TempDir::new().unwrap();
        let site = root.path().join("site");
        fs::create_dir(&site).unwrap();
        let mirror = mirror_at(&site);

        let (result, _client) = serve(&mirror, &get("/../../escape.txt"), &Scripted::ok(b"x"));

        result.unwrap();
        assert!(site.join("escape.txt").exists());
        assert_eq!(entries(root.path()), vec!["site"]);
    }

    #[test]
    fn concurrent_requests_for_different_paths() {
        let root = TempDir::new().unwrap();
        let mirror = mirror_at(root.path());

        std::thread::scope(|scope| {
            for i in 0..8 {
                let mirror = &mirror;
                scope.spawn(move || {
                    let path = format!("/n/{}.txt", i);
                    let (result, _client) = serve(mirror, &get(&path), &Scripted::ok(b"body"));
                    result.unwrap();
                });
            }
        });

        assert_eq!(entries(&root.path().join("n")).len(), 8);
    }

    /// Whether the filesystem under `dir` accepts `user.*` attributes
    #[cfg(unix)]
    fn user_xattrs_supported(dir: &Path) -> bool {
        if !xattr::SUPPORTED_PLATFORM {
            return false;
        }
        let check = dir.join("xattr-check");
        fs::write(&check, b"").unwrap();
        let supported = xattr::set(&check, "user.mirrorfs.check", b"1").is_ok();
        fs::remove_file(&check).unwrap();
        supported
    }

    #[cfg(unix)]
    fn xattr_mirror(root: &Path) -> Mirror {
        Mirror::new(MirrorConfig {
            root: root.display().to_string(),
            xattr: true,
            sha256_xattr: true,
            ..MirrorConfig::default()
        })
    }

    #[cfg(unix)]
    #[test]
    fn attributes_hold_etag_and_digest() {
        let root = TempDir::new().unwrap();
        if !user_xattrs_supported(root.path()) {
            return;
        }
        let mirror = xattr_mirror(root.path());
        let upstream = Scripted::ok(b"hi").etag("\"abc123\"");

        let (result, _client) = serve(&mirror, &get("/a.txt"), &upstream);

        let Disposition::Mirrored {
            outcome,
            bytes_written,
            diagnostics,
            ..
        } = result.unwrap()
        else {
            panic!("expected a mirror attempt");
        };
        assert_eq!(outcome, MirrorOutcome::Published);
        assert_eq!(bytes_written, 2);
        assert_eq!(diagnostics, 0);

        let target = root.path().join("a.txt");
        assert_eq!(
            xattr::get(&target, ETAG_ATTRIBUTE).unwrap(),
            Some(b"\"abc123\"".to_vec())
        );
        assert_eq!(
            xattr::get(&target, SHA256_ATTRIBUTE).unwrap(),
            Some(ContentDigest::of(b"hi").to_hex().into_bytes())
        );
        assert_eq!(entries(root.path()), vec!["a.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn error_response_sets_no_attributes() {
        let root = TempDir::new().unwrap();
        if !user_xattrs_supported(root.path()) {
            return;
        }
        let mirror = xattr_mirror(root.path());
        let upstream = Scripted::ok(b"gone")
            .status(StatusCode::NOT_FOUND)
            .etag("\"abc123\"");

        let (result, _client) = serve(&mirror, &get("/a.txt"), &upstream);
        result.unwrap();
        assert!(entries(root.path()).is_empty());

        // A previous mirror keeps its content and gains no attributes
        let target = root.path().join("b.txt");
        fs::write(&target, b"old").unwrap();
        let (result, _client) = serve(&mirror, &get("/b.txt"), &upstream);
        result.unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"old");
        assert_eq!(xattr::get(&target, ETAG_ATTRIBUTE).unwrap(), None);
        assert_eq!(xattr::get(&target, SHA256_ATTRIBUTE).unwrap(), None);
        assert_eq!(entries(root.path()), vec!["b.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn special_file_is_forbidden() {
        use std::os::unix::net::UnixListener;

        let root = TempDir::new().unwrap();
        let _socket = UnixListener::bind(root.path().join("sock")).unwrap();
        let mirror = mirror_at(root.path());

        let (result, client) = serve(&mirror, &get("/sock"), &Scripted::ok(b"x"));

        let err = result.unwrap_err();
        assert!(matches!(err, MirrorError::NotRegular(_)));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(client.status(), None);
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::path::Path;
    use std::thread::{self, JoinHandle};
    use tempfile::TempDir;

    /// Run the binary against a config file that does not exist
    fn mirrorfs(config_dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("mirrorfs");
        cmd.env("MIRRORFS_CONFIG", config_dir.join("config.toml"))
            .env_remove("MIRRORFS_UPSTREAM");
        cmd
    }

    /// Serve one canned HTTP response on a local port
    fn one_shot_server(response: &'static str) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        (url, handle)
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("write-through local mirror"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("mirrorfs"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[mirror]"))
            .stdout(predicate::str::contains("refresh_existing = true"));
    }

    #[test]
    fn config_set_then_show() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .args(["config", "set", "mirror.etag_file_suffix", ".etag"])
            .assert()
            .success();

        assert!(dir.path().join("config.toml").exists());
        mirrorfs(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("etag_file_suffix = \".etag\""));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .args(["config", "set", "mirror.nope", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "[mirror\n").unwrap();
        mirrorfs(dir.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));

        mirrorfs(dir.path())
            .args(["config", "init", "--force"])
            .assert()
            .success();
        mirrorfs(dir.path()).args(["config", "show"]).assert().success();
    }

    #[test]
    fn completions_generate() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("mirrorfs"));
    }

    #[test]
    fn inspect_absent_path_json() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        mirrorfs(dir.path())
            .args(["inspect", "/nothing.txt", "--json", "--root"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"kind\": \"absent\""));
    }

    #[test]
    fn inspect_relative_path_fails() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .args(["inspect", "nothing.txt", "--root"])
            .arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("not absolute"));
    }

    #[test]
    fn fetch_without_upstream_fails() {
        let dir = TempDir::new().unwrap();
        mirrorfs(dir.path())
            .args(["fetch", "/a.txt", "--root"])
            .arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("No upstream configured"))
            .stderr(predicate::str::contains("--upstream"));
    }

    #[test]
    fn fetch_mirrors_body_and_etag() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let (url, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nETag: \"abc123\"\r\nConnection: close\r\n\r\nhello",
        );

        mirrorfs(dir.path())
            .args(["fetch", "/pub/a.txt", "--etag-suffix", ".etag", "--upstream", &url, "--root"])
            .arg(&root)
            .assert()
            .success()
            .stdout("hello")
            .stderr(predicate::str::contains("Mirrored 5 bytes"));
        server.join().unwrap();

        let target = root.join("pub").join("a.txt");
        assert_eq!(fs::read(&target).unwrap(), b"hello");
        assert_eq!(fs::read(root.join("pub").join("a.txt.etag")).unwrap(), b"\"abc123\"");

        mirrorfs(dir.path())
            .args(["inspect", "/pub/a.txt", "--json", "--root"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"kind\": \"regular\""))
            .stdout(predicate::str::contains("\"size\": 5"));
    }

    #[test]
    fn fetch_not_found_leaves_no_mirror() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        let (url, server) = one_shot_server(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nConnection: close\r\n\r\ngone",
        );

        mirrorfs(dir.path())
            .args(["fetch", "/a.txt", "--upstream", &url, "--root"])
            .arg(&root)
            .assert()
            .success()
            .stdout("gone")
            .stderr(predicate::str::contains("404"));
        server.join().unwrap();

        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn failed_fetch_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        let out_dir = dir.path().join("out");
        fs::create_dir(&out_dir).unwrap();
        let out = out_dir.join("out.bin");
        fs::write(&out, b"previous").unwrap();
        // Nothing listens on a port freed right after binding
        let url = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}", listener.local_addr().unwrap())
        };

        mirrorfs(dir.path())
            .args(["fetch", "/b.bin", "--upstream", &url, "-o"])
            .arg(&out)
            .arg("--root")
            .arg(dir.path().join("root"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Upstream request"));

        assert_eq!(fs::read(&out).unwrap(), b"previous");
        let names: Vec<String> = fs::read_dir(&out_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.bin"]);
    }

    #[test]
    fn fetch_to_output_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let out = dir.path().join("out.bin");
        let (url, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nabc",
        );

        mirrorfs(dir.path())
            .args(["fetch", "/b.bin", "--upstream", &url, "-o"])
            .arg(&out)
            .arg("--root")
            .arg(&root)
            .assert()
            .success()
            .stdout("");
        server.join().unwrap();

        assert_eq!(fs::read(&out).unwrap(), b"abc");
        assert_eq!(fs::read(root.join("b.bin")).unwrap(), b"abc");
    }
}
