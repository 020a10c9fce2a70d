use super::*;
use crate::logging;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// how often `watch` looks at the close flag while no file event arrives
const CLOSE_CHECK_INTERVAL_MS: u64 = 100;

/// `FileDataSource` reads rules from a local file,
/// and reloads them whenever the file is created, modified or removed.
/// A missing file means there are no rules.
pub struct FileDataSource<P: SentinelRule + PartialEq + DeserializeOwned, H: PropertyHandler<P>> {
    ds: DataSourceBase<P, H>,
    path: PathBuf,
    closed: Arc<AtomicBool>,
}

impl<P: SentinelRule + PartialEq + DeserializeOwned, H: PropertyHandler<P>> FileDataSource<P, H> {
    pub fn new<T: Into<PathBuf>>(path: T, handlers: Vec<Arc<H>>) -> Self {
        let mut ds = DataSourceBase::default();
        for h in handlers {
            // incase of duplication, add it one by one, instead of adding all at once
            ds.add_property_handler(h);
        }
        FileDataSource {
            ds,
            path: path.into(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// initialize the datasource and load initial rules
    /// return error if initialize failed.
    pub fn initialize(&mut self) -> Result<()> {
        self.read_and_update()
    }

    /// `watch` reloads the rules on every change of the file, until the datasource is closed.
    /// The parent directory is watched, so that the file may be created, replaced or removed.
    /// Reload failures are logged and the watching goes on.
    pub fn watch(&mut self) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| Error::msg(format!("{:?} is not a file path", self.path)))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    if is_relevant(&event, &file_name) {
                        let _ = tx.send(());
                    }
                }
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        logging::info!(
            "[FileDataSource] File data source is watching file {:?}",
            self.path
        );

        // changes made before the watcher was registered
        self.reload();
        while !self.closed.load(Ordering::SeqCst) {
            match rx.recv_timeout(Duration::from_millis(CLOSE_CHECK_INTERVAL_MS)) {
                Ok(()) => {
                    // one reload covers the burst of events of a single write
                    while rx.try_recv().is_ok() {}
                    self.reload();
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    /// Close the data source, stop watching the file.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        logging::info!(
            "[FileDataSource] File data source has been closed, file {:?}",
            self.path
        );
    }

    /// `close_flag` lets another thread close the data source while `watch` runs,
    /// setting the flag has the same effect as `close`.
    pub fn close_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn reload(&mut self) {
        if let Err(err) = self.read_and_update() {
            logging::error!(
                "[FileDataSource] Fail to reload rules from file {:?}, reason: {:?}",
                self.path,
                err
            );
        }
    }

    fn read_and_update(&mut self) -> Result<()> {
        let src = self.read_source()?;
        self.get_base().update(src.as_deref())
    }

    /// Read original data from the data source.
    /// return `None` if the file does not exist.
    fn read_source(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            logging::warn!("[FileDataSource] File {:?} does not exist", self.path);
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

impl<P: SentinelRule + PartialEq + DeserializeOwned, H: PropertyHandler<P>> DataSource<P, H>
    for FileDataSource<P, H>
{
    fn get_base(&mut self) -> &mut DataSourceBase<P, H> {
        &mut self.ds
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::circuitbreaker::{Rule, RuleManager};
    use crate::utils::sleep_for_ms;
    use std::io::Write;

    const ONE_RULE: &str =
        r#"[{"resource": "abc", "grade": "ExceptionCount", "threshold": 3.0, "recovery_timeout_sec": 10}]"#;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("sentinel-rules-{}.json", uuid::Uuid::new_v4()))
    }

    fn write_rules(path: &PathBuf, content: &str) {
        let mut file = fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }

    fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
        for _ in 0..300 {
            if cond() {
                return true;
            }
            sleep_for_ms(10);
        }
        false
    }

    #[test]
    fn load_and_clear() {
        let manager = Arc::new(RuleManager::new());
        let handler = new_circuitbreaker_rule_handler(Arc::clone(&manager), rule_json_array_parser);
        let path = temp_path();
        write_rules(&path, ONE_RULE);
        let mut ds: FileDataSource<Rule, _> = FileDataSource::new(path.clone(), vec![handler]);
        ds.initialize().unwrap();
        assert_eq!(manager.get_rules_of_resource("abc").len(), 1);

        fs::remove_file(&path).unwrap();
        ds.read_and_update().unwrap();
        assert!(manager.get_rules().is_empty());
    }

    #[test]
    fn malformed_file_keeps_rules() {
        let manager = Arc::new(RuleManager::new());
        let handler = new_circuitbreaker_rule_handler(Arc::clone(&manager), rule_json_array_parser);
        let path = temp_path();
        write_rules(&path, ONE_RULE);
        let mut ds: FileDataSource<Rule, _> = FileDataSource::new(path.clone(), vec![handler]);
        ds.initialize().unwrap();
        write_rules(&path, "[{");
        assert!(ds.read_and_update().is_err());
        assert_eq!(manager.get_rules_of_resource("abc").len(), 1);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn writes_within_one_second_are_all_seen() {
        let manager = Arc::new(RuleManager::new());
        let handler = new_circuitbreaker_rule_handler(Arc::clone(&manager), rule_json_array_parser);
        let path = temp_path();
        write_rules(&path, ONE_RULE);
        let mut ds: FileDataSource<Rule, _> = FileDataSource::new(path.clone(), vec![handler]);
        ds.initialize().unwrap();
        let close_flag = ds.close_flag();
        let watcher = std::thread::spawn(move || ds.watch());

        write_rules(
            &path,
            r#"[{"resource": "abc", "grade": "ExceptionCount", "threshold": 4.0, "recovery_timeout_sec": 10}]"#,
        );
        assert!(wait_until(|| manager
            .get_rules_of_resource("abc")
            .iter()
            .any(|r| r.threshold == 4.0)));
        write_rules(
            &path,
            r#"[{"resource": "abc", "grade": "ExceptionCount", "threshold": 5.0, "recovery_timeout_sec": 10}]"#,
        );
        assert!(wait_until(|| manager
            .get_rules_of_resource("abc")
            .iter()
            .any(|r| r.threshold == 5.0)));

        fs::remove_file(&path).unwrap();
        assert!(wait_until(|| manager.get_rules().is_empty()));
        close_flag.store(true, Ordering::SeqCst);
        watcher.join().unwrap().unwrap();
    }

    #[test]
    fn relevant_events() {
        let name = OsString::from("rules.json");
        let event = Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/tmp/rules.json"));
        assert!(is_relevant(&event, &name));
        let other = Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/tmp/other.json"));
        assert!(!is_relevant(&other, &name));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/tmp/rules.json"));
        assert!(!is_relevant(&access, &name));
    }
}
