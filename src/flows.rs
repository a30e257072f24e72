//! Serve and build flows.
//!
//! Both flows are declared as explicit task graphs over a shared
//! [`Project`]. The serve flow additionally registers the watches that keep
//! `devserver/` current and then blocks in the dev server.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::archive::zip_directory;
use crate::copier::{copy_fileset, copy_matched, CopyStats, FileSet};
use crate::error::TaskError;
use crate::layout::{clean_dir, Layout};
use crate::manifest::Manifest;
use crate::script::ScriptBundler;
use crate::server::{DevServer, ReloadHub, ServeConfig};
use crate::style::StyleCompiler;
use crate::tasks::{Task, TaskGraph, TaskOutput, TaskReport, TaskStats};
use crate::theme::{preset_changed, preset_theme, theme_fileset, ThemeName};
use crate::toolchain::Toolchain;
use crate::transpile::{transpile_fileset, transpile_matched};
use crate::watcher::{WatchRule, WatchSet};

impl From<CopyStats> for TaskOutput {
    fn from(stats: CopyStats) -> Self {
        TaskOutput::new(stats.files, stats.bytes)
    }
}

/// Everything a flow needs to run its tasks
#[derive(Debug, Clone)]
pub struct Project {
    pub layout: Layout,
    pub manifest: Manifest,
    pub theme: ThemeName,
    pub toolchain: Toolchain,
    /// Minify scripts and styles written to devserver/
    pub serve_minify: bool,
}

impl Project {
    /// Load the manifest from the layout root
    pub fn load(layout: Layout, theme: ThemeName, toolchain: Toolchain) -> Result<Self, TaskError> {
        let manifest = Manifest::load(&layout.manifest_path())?;
        Ok(Self {
            layout,
            manifest,
            theme,
            toolchain,
            serve_minify: true,
        })
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    // ==================== file sets ====================

    /// src/ files copied verbatim to devserver/: everything except scripts,
    /// Sass sources and themes
    pub fn src_assets(&self) -> Result<FileSet, TaskError> {
        FileSet::new(
            &self.layout.src,
            &["**/*"],
            &["**/*.js", "sass/**", "*.scss", "theme/**"],
        )
    }

    /// Scripts that feed the bundle
    pub fn src_scripts(&self) -> Result<FileSet, TaskError> {
        FileSet::new(&self.layout.src, &["**/*.js"], &["theme/**"])
    }

    /// Sass sources that feed the stylesheet
    pub fn src_styles(&self) -> Result<FileSet, TaskError> {
        FileSet::new(&self.layout.src, &["**/*.scss"], &["theme/**"])
    }

    pub fn dev_scripts(&self) -> Result<FileSet, TaskError> {
        FileSet::new(&self.layout.src_dev, &["**/*.js"], &[])
    }

    pub fn dev_assets(&self) -> Result<FileSet, TaskError> {
        FileSet::new(&self.layout.src_dev, &["**/*"], &["**/*.js"])
    }

    // ==================== task bodies ====================

    pub fn preset(&self) -> Result<TaskOutput, TaskError> {
        preset_theme(&self.layout, &self.theme).map(Into::into)
    }

    pub fn compile_styles(&self, dest: &Path, compress: bool) -> Result<TaskOutput, TaskError> {
        let output = StyleCompiler::new(self.layout.style_entry(), compress).compile(dest)?;
        Ok(TaskOutput::new(2, output.bytes))
    }

    pub fn bundle_scripts(&self, dest: &Path, minify: bool) -> Result<TaskOutput, TaskError> {
        let bundle = ScriptBundler::new(self.layout.script_entry(), minify).bundle(
            &self.toolchain,
            &self.manifest,
            dest,
        )?;
        let bytes = std::fs::metadata(&bundle).map(|m| m.len()).unwrap_or(0);
        Ok(TaskOutput::new(2, bytes))
    }

    fn devserver_css(&self) -> std::path::PathBuf {
        self.layout.devserver.join("css")
    }

    // ==================== serve ====================

    /// `[preset:theme, serve:clean]` then the six parallel devserver tasks
    pub fn serve_graph(self: &Arc<Self>) -> TaskGraph {
        let p = Arc::clone(self);
        let preset = Task::new("preset:theme", move || p.preset());
        let p = Arc::clone(self);
        let clean = Task::new("serve:clean", move || {
            clean_dir(&p.layout.devserver)?;
            Ok(TaskOutput::default())
        });

        let p = Arc::clone(self);
        let copy_lib = Task::new("serve:copy-lib", move || {
            let set = FileSet::all(&p.layout.lib)?;
            copy_fileset(&set, &p.layout.devserver.join("lib")).map(Into::into)
        });
        let p = Arc::clone(self);
        let bundle = Task::new("serve:bundle", move || {
            p.bundle_scripts(&p.layout.devserver, p.serve_minify)
        });
        let p = Arc::clone(self);
        let sass = Task::new("serve:sass", move || {
            p.compile_styles(&p.devserver_css(), p.serve_minify)
        });
        let p = Arc::clone(self);
        let copy_src = Task::new("serve:copy-src", move || {
            copy_fileset(&p.src_assets()?, &p.layout.devserver).map(Into::into)
        });
        let p = Arc::clone(self);
        let bundle_dev = Task::new("serve:bundle-src-dev", move || {
            let stats = transpile_fileset(&p.toolchain, &p.dev_scripts()?, &p.layout.devserver)?;
            Ok(TaskOutput::new(stats.files, 0))
        });
        let p = Arc::clone(self);
        let copy_dev = Task::new("serve:copy-src-dev", move || {
            copy_fileset(&p.dev_assets()?, &p.layout.devserver).map(Into::into)
        });

        TaskGraph::new()
            .stage(vec![preset, clean])
            .stage(vec![copy_lib, bundle, sass, copy_src, bundle_dev, copy_dev])
    }

    /// Watches that regenerate single devserver artifacts on change
    pub fn serve_watches(self: &Arc<Self>, hub: &Arc<ReloadHub>) -> Result<Vec<WatchRule>, TaskError> {
        let mut rules = Vec::new();

        let p = Arc::clone(self);
        rules.push(WatchRule::new(
            "theme",
            theme_fileset(&self.layout, &self.theme)?,
            move |file| log_copy("theme", file, preset_changed(&p.layout, &p.theme, file)),
        ));

        let p = Arc::clone(self);
        rules.push(WatchRule::batch("scripts", self.src_scripts()?, move |_| {
            if let Err(e) = p.bundle_scripts(&p.layout.devserver, p.serve_minify) {
                error!(watch = "scripts", error = %e, "bundle failed");
            }
        }));

        let p = Arc::clone(self);
        rules.push(WatchRule::batch("styles", self.src_styles()?, move |_| {
            if let Err(e) = p.compile_styles(&p.devserver_css(), p.serve_minify) {
                error!(watch = "styles", error = %e, "style compile failed");
            }
        }));

        let p = Arc::clone(self);
        let set = self.src_assets()?;
        rules.push(WatchRule::new("src-assets", set.clone(), move |file| {
            log_copy("src-assets", file, copy_matched(&set, file, &p.layout.devserver))
        }));

        let p = Arc::clone(self);
        let set = self.dev_scripts()?;
        rules.push(WatchRule::new("dev-scripts", set.clone(), move |file| {
            if let Err(e) = transpile_matched(&p.toolchain, &set, file, &p.layout.devserver) {
                error!(watch = "dev-scripts", path = %file.display(), error = %e, "transpile failed");
            }
        }));

        let p = Arc::clone(self);
        let set = self.dev_assets()?;
        rules.push(WatchRule::new("dev-assets", set.clone(), move |file| {
            log_copy("dev-assets", file, copy_matched(&set, file, &p.layout.devserver))
        }));

        let hub = Arc::clone(hub);
        rules.push(WatchRule::batch(
            "livereload",
            FileSet::all(&self.layout.devserver)?,
            move |_| {
                hub.notify();
            },
        ));

        Ok(rules)
    }

    // ==================== build ====================

    /// `[preset:theme]`, `[build:clean]`, compile and copy in parallel, then zip
    pub fn build_graph(self: &Arc<Self>) -> TaskGraph {
        let pkg = self.layout.package_dir(self.version());

        let p = Arc::clone(self);
        let preset = Task::new("preset:theme", move || p.preset());

        let dir = pkg.clone();
        let clean = Task::new("build:clean", move || {
            clean_dir(&dir)?;
            Ok(TaskOutput::default())
        });

        let p = Arc::clone(self);
        let dir = pkg.clone();
        let sass = Task::new("build:sass", move || p.compile_styles(&dir.join("css"), true));

        let p = Arc::clone(self);
        let dir = pkg.clone();
        let bundle = Task::new("build:bundle", move || p.bundle_scripts(&dir, true));

        let copy = |name: &'static str, from: std::path::PathBuf, to: std::path::PathBuf| {
            Task::new(name, move || {
                copy_fileset(&FileSet::all(&from)?, &to).map(Into::into)
            })
        };
        let copy_image = copy("build:copy:image", self.layout.src.join("image"), pkg.join("image"));
        let copy_assets = copy("build:copy:assets", self.layout.src.join("assets"), pkg.join("assets"));
        let copy_videojs = copy(
            "build:copy:videojs",
            self.layout.lib.join("video.js"),
            pkg.join("lib").join("video.js"),
        );

        let archive = self.layout.archive_path(self.version());
        let dir = pkg;
        let zip = Task::new("build:zip", move || {
            let stats = zip_directory(&dir, &archive)?;
            info!(archive = %archive.display(), files = stats.files, "packaged");
            Ok(TaskOutput::new(1, std::fs::metadata(&archive).map(|m| m.len()).unwrap_or(0)))
        });

        TaskGraph::new()
            .stage(vec![preset])
            .stage(vec![clean])
            .stage(vec![sass, bundle, copy_image, copy_assets, copy_videojs])
            .stage(vec![zip])
    }
}

fn log_copy(watch: &str, file: &Path, result: Result<CopyStats, TaskError>) {
    match result {
        Ok(stats) if stats.files > 0 => info!(watch, path = %file.display(), "copied"),
        Ok(_) => {}
        Err(e) => warn!(watch, path = %file.display(), error = %e, "copy failed"),
    }
}

/// Run the serve flow: assemble devserver/, start the watches, then serve
/// until the process is killed
pub fn serve(project: Arc<Project>, config: ServeConfig) -> Result<(), TaskError> {
    let stats = TaskStats::new();
    project.serve_graph().run(&stats, &|_: &TaskReport| {});

    let hub = Arc::new(ReloadHub::new());
    let mut watches = WatchSet::new();
    for rule in project.serve_watches(&hub)? {
        if !config.livereload && rule.name == "livereload" {
            continue;
        }
        watches.add(rule)?;
    }
    info!(watches = ?watches.names(), "watching for changes");

    DevServer::new(&project.layout.devserver, config, hub).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{collect_results, TaskStatus};
    use std::fs;
    use std::fs::File;
    use tempfile::TempDir;

    const THEME_VARS: &str = "$accent: #0a84ff;\n";
    const ENTRY: &str = "@import \"sass/vars\";\n.vjs-big-play { color: $accent; user-select: none; }\n";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// A project tree shaped like the player repository
    fn project(temp: &TempDir) -> Arc<Project> {
        let root = temp.path();
        write(
            &root.join("package.json"),
            r#"{"name": "videocompolib", "version": "1.2.3", "peerDependencies": {"jquery": "^3.2.1"}}"#,
        );
        write(&root.join("src/theme.scss"), ENTRY);
        write(&root.join("src/VideoCompoLib.js"), "import './ui/controls';");
        write(&root.join("src/ui/controls.js"), "export default 1;");
        write(&root.join("src/image/play.png"), "png");
        write(&root.join("src/assets/fonts/icons.woff"), "woff");
        write(&root.join("src/templates/controls.html"), "<div/>");
        write(&root.join("src/theme/default/sass/_vars.scss"), THEME_VARS);
        write(&root.join("src/theme/custom/sass/_vars.scss"), "$accent: #ff0000;\n");
        write(&root.join("src/theme/custom/image/logo.png"), "logo");
        write(&root.join("src-dev/index.html"), "<html><body></body></html>");
        write(&root.join("src-dev/demo.js"), "const a = () => 1;");
        write(&root.join("lib/video.js/video.min.js"), "vjs");
        write(&root.join("lib/jquery/jquery.min.js"), "jq");

        let layout = Layout::new(root);
        let toolchain = Toolchain::new(root.join("no-esbuild"));
        Arc::new(Project::load(layout, ThemeName::default(), toolchain).unwrap())
    }

    fn run(graph: &TaskGraph) -> Vec<TaskReport> {
        graph.run(&TaskStats::new(), &|_: &TaskReport| {})
    }

    fn status_of<'a>(reports: &'a [TaskReport], name: &str) -> &'a TaskStatus {
        &reports.iter().find(|r| r.name == name).unwrap().status
    }

    #[test]
    fn test_project_load_reads_manifest() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        assert_eq!(project.version(), "1.2.3");
        assert!(project.serve_minify);
    }

    #[test]
    fn test_project_load_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let result = Project::load(Layout::new(temp.path()), ThemeName::default(), Toolchain::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_serve_graph_plan() {
        let temp = TempDir::new().unwrap();
        let graph = project(&temp).serve_graph();

        assert_eq!(
            graph.plan(),
            vec![
                vec!["preset:theme", "serve:clean"],
                vec![
                    "serve:copy-lib",
                    "serve:bundle",
                    "serve:sass",
                    "serve:copy-src",
                    "serve:bundle-src-dev",
                    "serve:copy-src-dev",
                ],
            ]
        );
    }

    #[test]
    fn test_build_graph_plan() {
        let temp = TempDir::new().unwrap();
        let graph = project(&temp).build_graph();

        assert_eq!(
            graph.plan(),
            vec![
                vec!["preset:theme"],
                vec!["build:clean"],
                vec![
                    "build:sass",
                    "build:bundle",
                    "build:copy:image",
                    "build:copy:assets",
                    "build:copy:videojs",
                ],
                vec!["build:zip"],
            ]
        );
    }

    #[test]
    fn test_build_without_bundler_still_packages() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);

        let reports = run(&project.build_graph());

        assert!(matches!(
            status_of(&reports, "build:bundle"),
            TaskStatus::Failed(TaskError::ToolMissing { .. })
        ));
        assert!(status_of(&reports, "build:sass").is_success());
        assert!(status_of(&reports, "build:zip").is_success());

        let archive = temp.path().join("dist").join("VideoCompoLib-1.2.3.zip");
        let archive = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        assert!(names.contains(&"css/theme.css"));
        assert!(names.contains(&"css/theme.css.map"));
        assert!(names.contains(&"image/play.png"));
        assert!(names.contains(&"assets/fonts/icons.woff"));
        assert!(names.contains(&"lib/video.js/video.min.js"));
        assert!(!names.iter().any(|n| n.starts_with("lib/jquery")));
        assert!(!names.iter().any(|n| n.starts_with("VideoPlayer-")));

        let (_, has_success, has_failure) = collect_results(reports);
        assert!(has_success);
        assert!(has_failure);
    }

    #[test]
    fn test_build_clean_removes_stale_files() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        let stale = project.layout.package_dir("1.2.3").join("old.js");
        write(&stale, "stale");

        run(&project.build_graph());

        assert!(!stale.exists());
    }

    #[test]
    fn test_build_uses_selected_theme() {
        let temp = TempDir::new().unwrap();
        let base = project(&temp);
        let project = Arc::new(Project {
            theme: ThemeName::parse(Some("custom")).unwrap(),
            ..(*base).clone()
        });

        run(&project.build_graph());

        let css = fs::read_to_string(project.layout.package_dir("1.2.3").join("css").join("theme.css")).unwrap();
        assert!(css.contains("red") || css.contains("#f00"));
        assert!(project.layout.src.join("image").join("logo.png").exists());
    }

    #[test]
    fn test_serve_graph_assembles_devserver() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        write(&project.layout.devserver.join("stale.txt"), "old");

        let reports = run(&project.serve_graph());
        let devserver = &project.layout.devserver;

        assert!(!devserver.join("stale.txt").exists());
        assert!(devserver.join("lib").join("video.js").join("video.min.js").exists());
        assert!(devserver.join("lib").join("jquery").join("jquery.min.js").exists());
        assert!(devserver.join("css").join("theme.css").exists());
        assert!(devserver.join("image").join("play.png").exists());
        assert!(devserver.join("templates").join("controls.html").exists());
        assert!(devserver.join("index.html").exists());
        assert!(!devserver.join("theme.scss").exists());
        assert!(!devserver.join("sass").exists());
        assert!(!devserver.join("theme").exists());
        assert!(!devserver.join("ui").exists());

        assert!(!status_of(&reports, "serve:bundle").is_success());
        assert!(!status_of(&reports, "serve:bundle-src-dev").is_success());
        assert!(status_of(&reports, "serve:copy-src").is_success());
    }

    #[test]
    fn test_serve_watches_cover_sources() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        let hub = Arc::new(ReloadHub::new());

        let rules = project.serve_watches(&hub).unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name).collect();

        assert_eq!(
            names,
            vec!["theme", "scripts", "styles", "src-assets", "dev-scripts", "dev-assets", "livereload"]
        );
    }

    #[test]
    fn test_whole_artifact_watches_run_per_batch() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        let hub = Arc::new(ReloadHub::new());

        let rules = project.serve_watches(&hub).unwrap();
        let batched: Vec<_> = rules.iter().filter(|r| r.per_batch).map(|r| r.name).collect();

        assert_eq!(batched, vec!["scripts", "styles", "livereload"]);
    }

    #[test]
    fn test_watch_action_copies_single_asset() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        let hub = Arc::new(ReloadHub::new());
        let rules = project.serve_watches(&hub).unwrap();
        let changed = project.layout.src.join("templates").join("controls.html");
        let rule = rules.iter().find(|r| r.name == "src-assets").unwrap();

        assert!(rule.set.matches(&changed));
        (rule.action)(&changed);

        assert!(project.layout.devserver.join("templates").join("controls.html").exists());
        assert!(!project.layout.devserver.join("image").exists());
    }

    #[test]
    fn test_watch_action_recompiles_styles_only() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        preset_theme(&project.layout, &project.theme).unwrap();
        let hub = Arc::new(ReloadHub::new());
        let rules = project.serve_watches(&hub).unwrap();
        let rule = rules.iter().find(|r| r.name == "styles").unwrap();

        (rule.action)(&project.layout.style_entry());

        assert!(project.layout.devserver.join("css").join("theme.css").exists());
        assert!(!project.layout.devserver.join("image").exists());
    }

    #[test]
    fn test_livereload_watch_bumps_hub() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        let hub = Arc::new(ReloadHub::new());
        let rules = project.serve_watches(&hub).unwrap();
        let rule = rules.iter().find(|r| r.name == "livereload").unwrap();

        (rule.action)(&project.layout.devserver.join("index.html"));

        assert_eq!(hub.generation(), 1);
    }
}
