//! Dispatch engine behaviour against real configuration files.

use std::any::Any;
use std::cell::Cell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::{Duration, SystemTime};

use nss_switch::{
	DEFAULT_NIS, DtabEntry, MethodEntry, NsContext, NsRequest, NsSrc, NsStatus, NsSwitch, SwitchConfig, module::abi,
};
use parking_lot::Mutex;
use tempfile::TempDir;

struct Fixture {
	dir: TempDir,
	switch: NsSwitch,
}

impl Fixture {
	fn new(conf: &str) -> Self {
		Self::with_modules(conf, None)
	}

	fn with_modules(conf: &str, module_dir: Option<PathBuf>) -> Self {
		let _ = tracing_subscriber::fmt::try_init();
		let dir = tempfile::tempdir().expect("temp dir should be creatable");
		let conf_path = dir.path().join("nsswitch.conf");
		fs::write(&conf_path, conf).expect("config should be writable");
		let switch = NsSwitch::new(SwitchConfig { conf_path, module_dir });
		Self { dir, switch }
	}

	fn conf_path(&self) -> PathBuf {
		self.dir.path().join("nsswitch.conf")
	}

	/// Rewrites the config and pushes its mtime forward so the change is seen.
	fn rewrite(&self, conf: &str, bump: u64) {
		rewrite_config(&self.conf_path(), conf, bump);
	}
}

fn rewrite_config(path: &Path, conf: &str, bump: u64) {
	fs::write(path, conf).expect("config should be writable");
	let file = File::options().write(true).open(path).expect("config should open");
	file.set_modified(SystemTime::now() + Duration::from_secs(bump))
		.expect("mtime should be settable");
}

/// Registers `source` as a builtin answering `database`/`method` with `status`.
fn counting(switch: &NsSwitch, source: &str, database: &str, method: &str, status: NsStatus) -> Arc<AtomicUsize> {
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&calls);
	let (database, method) = (database.to_string(), method.to_string());
	switch.register_builtin(
		source,
		Arc::new(move |_: &str| {
			let counter = Arc::clone(&counter);
			vec![MethodEntry::shared(database.clone(), method.clone(), move |_, _| {
				counter.fetch_add(1, Ordering::SeqCst);
				status
			})]
		}),
	);
	calls
}

fn calls(counter: &AtomicUsize) -> usize {
	counter.load(Ordering::SeqCst)
}

/// A builtin that parks inside its method until released.
struct Parked {
	entered: Arc<Barrier>,
	release: Arc<Barrier>,
}

impl Parked {
	/// Registers `source` answering `hosts`/`lookup` by parking.
	fn register(switch: &NsSwitch, source: &str) -> Self {
		let entered = Arc::new(Barrier::new(2));
		let release = Arc::new(Barrier::new(2));
		let (inside, leave) = (Arc::clone(&entered), Arc::clone(&release));
		switch.register_builtin(
			source,
			Arc::new(move |_: &str| {
				let (inside, leave) = (Arc::clone(&inside), Arc::clone(&leave));
				vec![MethodEntry::shared("hosts", "lookup", move |_, _| {
					inside.wait();
					leave.wait();
					NsStatus::SUCCESS
				})]
			}),
		);
		Self { entered, release }
	}
}

/// Runs `reconfigure` on a new thread, reporting its result on the channel.
fn reconfigure_in_background(switch: &Arc<NsSwitch>) -> (thread::JoinHandle<()>, mpsc::Receiver<bool>) {
	let (tx, rx) = mpsc::channel();
	let switch = Arc::clone(switch);
	let handle = thread::spawn(move || {
		let _ = tx.send(switch.reconfigure());
	});
	(handle, rx)
}

#[test]
fn stop_set_decides_whether_later_sources_run() {
	let fx = Fixture::new("hosts: alpha [notfound=return] beta\n");
	let alpha = counting(&fx.switch, "alpha", "hosts", "gethostbyname", NsStatus::NOTFOUND);
	let beta = counting(&fx.switch, "beta", "hosts", "gethostbyname", NsStatus::SUCCESS);
	let req = NsRequest::new("hosts", "gethostbyname");

	assert_eq!(fx.switch.dispatch(&req, &mut ()), NsStatus::NOTFOUND);
	assert_eq!((calls(&alpha), calls(&beta)), (1, 0));

	fx.rewrite("hosts: alpha beta\n", 10);
	assert_eq!(fx.switch.dispatch(&req, &mut ()), NsStatus::SUCCESS);
	assert_eq!((calls(&alpha), calls(&beta)), (2, 1));
}

#[test]
fn unconfigured_database_walks_defaults_in_order() {
	let fx = Fixture::new("hosts: files\n");
	let order = Arc::new(Mutex::new(Vec::new()));
	for (name, status) in [("alpha", NsStatus::NOTFOUND), ("beta", NsStatus::SUCCESS), ("gamma", NsStatus::SUCCESS)] {
		let order = Arc::clone(&order);
		fx.switch.register_builtin(
			name,
			Arc::new(move |_: &str| {
				let order = Arc::clone(&order);
				vec![MethodEntry::shared("shells", "getusershell", move |cx, _| {
					order.lock().push(cx.source().to_string());
					status
				})]
			}),
		);
	}

	let defaults = [
		NsSrc::new("alpha", NsStatus::SUCCESS),
		NsSrc::new("beta", NsStatus::SUCCESS),
		NsSrc::new("gamma", NsStatus::SUCCESS),
	];
	let req = NsRequest::new("shells", "getusershell").defaults(&defaults);
	let first = fx.switch.dispatch(&req, &mut ());
	let second = fx.switch.dispatch(&req, &mut ());

	assert_eq!(first, NsStatus::SUCCESS);
	assert_eq!(first, second);
	assert_eq!(*order.lock(), ["alpha", "beta", "alpha", "beta"]);
}

#[test]
fn nested_dispatch_never_reconfigures() {
	let fx = Fixture::new("passwd: compat\npasswd_compat: nis\n");
	let generations = Arc::new(Mutex::new(Vec::new()));
	{
		let generations = Arc::clone(&generations);
		fx.switch.register_builtin(
			"nis",
			Arc::new(move |_: &str| {
				let generations = Arc::clone(&generations);
				vec![MethodEntry::shared("passwd_compat", "getpwent_r", move |cx, _| {
					generations.lock().push((cx.generation(), cx.depth()));
					NsStatus::SUCCESS
				})]
			}),
		);
	}

	let outer_generation = Cell::new(None);
	let conf_path = fx.conf_path();
	let compat = |cx: &NsContext<'_>, args: &mut dyn Any| -> NsStatus {
		outer_generation.set(Some(cx.generation()));
		rewrite_config(&conf_path, "# touched\npasswd: compat\npasswd_compat: nis\n", 60);

		assert!(!cx.switch().reconfigure());
		let nested = NsRequest::new("passwd_compat", "getpwent_r").defaults(DEFAULT_NIS);
		let via_context = cx.dispatch(&nested, &mut *args);
		let via_switch = cx.switch().dispatch(&nested, &mut *args);
		assert_eq!(cx.switch().snapshot().generation(), cx.generation());
		if via_context == NsStatus::SUCCESS && via_switch == NsStatus::SUCCESS {
			NsStatus::SUCCESS
		} else {
			NsStatus::UNAVAIL
		}
	};
	let dtab = [DtabEntry::new("compat", &compat)];
	let req = NsRequest::new("passwd", "getpwent_r").dtab(&dtab);

	assert_eq!(fx.switch.dispatch(&req, &mut ()), NsStatus::SUCCESS);
	let outer = outer_generation.get().expect("compat override should run");
	assert_eq!(*generations.lock(), [(outer, 1), (outer, 1)]);

	// The deferred change is picked up by the next top-level call.
	assert_eq!(fx.switch.dispatch(&req, &mut ()), NsStatus::SUCCESS);
	assert!(outer_generation.get().expect("compat override should run") > outer);
}

#[test]
fn unloadable_module_is_skipped() {
	let modules = tempfile::tempdir().expect("temp dir should be creatable");
	fs::write(modules.path().join(abi::module_file_name("bogus")), b"\x7fELF garbage").expect("module should be writable");
	let fx = Fixture::with_modules("hosts: bogus missing alpha\n", Some(modules.path().to_path_buf()));
	let alpha = counting(&fx.switch, "alpha", "hosts", "gethostbyname", NsStatus::SUCCESS);

	let status = fx.switch.dispatch(&NsRequest::new("hosts", "gethostbyname"), &mut ());

	assert_eq!(status, NsStatus::SUCCESS);
	assert_eq!(calls(&alpha), 1);
	let snapshot = fx.switch.snapshot();
	assert!(snapshot.modules().get("bogus").is_none());
	assert!(snapshot.modules().get("missing").is_none());
}

#[test]
fn force_all_runs_every_source_once() {
	let fx = Fixture::new("passwd: alpha beta [unavail=return] gamma\n");
	let alpha = counting(&fx.switch, "alpha", "passwd", "setpwent", NsStatus::SUCCESS);
	let beta = counting(&fx.switch, "beta", "passwd", "setpwent", NsStatus::UNAVAIL);
	let gamma = counting(&fx.switch, "gamma", "passwd", "setpwent", NsStatus::NOTFOUND);

	let status = fx.switch.dispatch(&NsRequest::new("passwd", "setpwent").force_all(), &mut ());
	assert_eq!((calls(&alpha), calls(&beta), calls(&gamma)), (1, 1, 1));
	assert_eq!(status, NsStatus::NOTFOUND);

	fx.switch.dispatch(&NsRequest::new("passwd", "setpwent"), &mut ());
	assert_eq!((calls(&alpha), calls(&beta), calls(&gamma)), (2, 1, 1));
}

#[test]
fn override_table_takes_priority_over_modules() {
	let fx = Fixture::new("hosts: alpha\n");
	let module = counting(&fx.switch, "alpha", "hosts", "gethostbyname", NsStatus::NOTFOUND);
	let override_calls = Cell::new(0);
	let alpha = |_: &NsContext<'_>, args: &mut dyn Any| -> NsStatus {
		override_calls.set(override_calls.get() + 1);
		if let Some(answer) = args.downcast_mut::<Option<String>>() {
			*answer = Some("localhost".into());
		}
		NsStatus::SUCCESS
	};
	let dtab = [DtabEntry::new("ALPHA", &alpha)];

	let mut answer: Option<String> = None;
	let status = fx.switch.dispatch(&NsRequest::new("hosts", "gethostbyname").dtab(&dtab), &mut answer);

	assert_eq!(status, NsStatus::SUCCESS);
	assert_eq!(answer.as_deref(), Some("localhost"));
	assert_eq!((override_calls.get(), calls(&module)), (1, 0));
}

#[test]
fn missing_database_or_method_is_unavailable() {
	let fx = Fixture::new("hosts: alpha\n");
	let alpha = counting(&fx.switch, "alpha", "hosts", "gethostbyname", NsStatus::SUCCESS);

	assert_eq!(fx.switch.dispatch(&NsRequest::new("", "gethostbyname"), &mut ()), NsStatus::UNAVAIL);
	assert_eq!(fx.switch.dispatch(&NsRequest::new("hosts", ""), &mut ()), NsStatus::UNAVAIL);
	assert_eq!(calls(&alpha), 0);
}

#[test]
fn result_reflects_last_source_and_drops_private_bits() {
	let fx = Fixture::new("hosts: alpha [notfound=return]\nnetworks: alpha beta\nprotocols: beta gamma\n");
	counting(&fx.switch, "alpha", "hosts", "lookup", NsStatus::NOTFOUND | NsStatus::private(2));
	counting(&fx.switch, "beta", "networks", "lookup", NsStatus::UNAVAIL);
	counting(&fx.switch, "gamma", "protocols", "lookup", NsStatus::TRYAGAIN);

	assert_eq!(fx.switch.dispatch(&NsRequest::new("hosts", "lookup"), &mut ()), NsStatus::NOTFOUND);
	// beta is last and returned a status outside its stop set.
	assert_eq!(fx.switch.dispatch(&NsRequest::new("networks", "lookup"), &mut ()), NsStatus::UNAVAIL);
	assert_eq!(fx.switch.dispatch(&NsRequest::new("protocols", "lookup"), &mut ()), NsStatus::TRYAGAIN);
	// Nothing implements this method anywhere.
	assert_eq!(fx.switch.dispatch(&NsRequest::new("protocols", "other"), &mut ()), NsStatus::NOTFOUND);
}

#[test]
fn reconfigure_tracks_modification_time() {
	let fx = Fixture::new("hosts: alpha\n");
	counting(&fx.switch, "alpha", "hosts", "lookup", NsStatus::SUCCESS);

	assert!(fx.switch.reconfigure());
	let loaded = fx.switch.snapshot().generation();
	assert!(!fx.switch.reconfigure());
	assert_eq!(fx.switch.snapshot().generation(), loaded);

	fx.rewrite("hosts: beta\n", 30);
	assert!(fx.switch.reconfigure());
	let snapshot = fx.switch.snapshot();
	assert!(snapshot.generation() > loaded);
	assert_eq!(snapshot.sources().get("hosts").map(|d| d.sources()[0].name()), Some("beta"));
}

#[test]
fn absent_config_keeps_existing_tables() {
	let fx = Fixture::new("hosts: alpha\n");
	assert!(fx.switch.reconfigure());
	let loaded = fx.switch.snapshot().generation();

	fs::remove_file(fx.conf_path()).expect("config should be removable");
	assert!(!fx.switch.reconfigure());
	assert_eq!(fx.switch.snapshot().generation(), loaded);
	assert!(fx.switch.snapshot().sources().get("hosts").is_some());
	assert!(fx.switch.reload().is_err());
}

#[test]
fn builtins_survive_reload() {
	let fx = Fixture::new("hosts: alpha\n");
	let alpha = counting(&fx.switch, "alpha", "hosts", "lookup", NsStatus::SUCCESS);
	let req = NsRequest::new("hosts", "lookup");

	assert_eq!(fx.switch.dispatch(&req, &mut ()), NsStatus::SUCCESS);
	fx.rewrite("hosts: alpha\nnetworks: alpha\n", 20);
	assert!(fx.switch.reload().expect("config should reload"));
	assert_eq!(fx.switch.dispatch(&req, &mut ()), NsStatus::SUCCESS);
	assert_eq!(calls(&alpha), 2);
}

#[test]
fn reconfigure_on_another_thread_waits_for_running_dispatch() {
	let fx = Fixture::new("hosts: alpha\n");
	let switch = Arc::new(NsSwitch::new(fx.switch.config().clone()));
	let parked = Parked::register(&switch, "alpha");
	assert!(switch.reconfigure());
	let loaded = switch.snapshot().generation();

	let dispatcher = {
		let switch = Arc::clone(&switch);
		thread::spawn(move || switch.dispatch(&NsRequest::new("hosts", "lookup"), &mut ()))
	};
	parked.entered.wait();

	fx.rewrite("hosts: alpha\nnetworks: alpha\n", 40);
	let (reconfigurer, result) = reconfigure_in_background(&switch);
	assert!(result.recv_timeout(Duration::from_millis(200)).is_err());
	assert_eq!(switch.snapshot().generation(), loaded);

	parked.release.wait();
	assert_eq!(dispatcher.join().expect("dispatcher should not panic"), NsStatus::SUCCESS);
	assert_eq!(result.recv_timeout(Duration::from_secs(10)), Ok(true));
	reconfigurer.join().expect("reconfigurer should not panic");
	assert!(switch.snapshot().generation() > loaded);
}

#[test]
fn unreadable_config_is_not_reread_until_it_changes() {
	let dir = tempfile::tempdir().expect("temp dir should be creatable");
	// A directory has a modification time but cannot be read as a file.
	let switch = Arc::new(NsSwitch::new(SwitchConfig {
		conf_path: dir.path().to_path_buf(),
		module_dir: None,
	}));
	let parked = Parked::register(&switch, "alpha");
	let loaded = switch.snapshot().generation();
	assert!(!switch.reconfigure());

	let dispatcher = {
		let switch = Arc::clone(&switch);
		thread::spawn(move || {
			let defaults = [NsSrc::new("alpha", NsStatus::SUCCESS)];
			switch.dispatch(&NsRequest::new("hosts", "lookup").defaults(&defaults), &mut ())
		})
	};
	parked.entered.wait();

	// An unchanged stamp answers without waiting for the running dispatch.
	let (reconfigurer, result) = reconfigure_in_background(&switch);
	let answer = result.recv_timeout(Duration::from_secs(10));
	parked.release.wait();
	assert_eq!(answer, Ok(false));

	assert_eq!(dispatcher.join().expect("dispatcher should not panic"), NsStatus::SUCCESS);
	reconfigurer.join().expect("reconfigurer should not panic");
	assert_eq!(switch.snapshot().generation(), loaded);
}

#[test]
fn builtin_registered_inside_dispatch_waits_for_next_call() {
	let fx = Fixture::new("hosts: alpha beta\n");
	let beta = Arc::new(AtomicUsize::new(0));
	{
		let beta = Arc::clone(&beta);
		fx.switch.register_builtin(
			"alpha",
			Arc::new(move |_: &str| {
				let beta = Arc::clone(&beta);
				vec![MethodEntry::shared("hosts", "lookup", move |cx, _| {
					let before = cx.switch().snapshot().generation();
					let counter = Arc::clone(&beta);
					cx.switch().register_builtin(
						"beta",
						Arc::new(move |_: &str| {
							let counter = Arc::clone(&counter);
							vec![MethodEntry::shared("hosts", "lookup", move |_, _| {
								counter.fetch_add(1, Ordering::SeqCst);
								NsStatus::SUCCESS
							})]
						}),
					);
					assert_eq!(cx.switch().snapshot().generation(), before);
					assert_eq!(cx.generation(), before);
					NsStatus::NOTFOUND
				})]
			}),
		);
	}
	let req = NsRequest::new("hosts", "lookup");

	assert_eq!(fx.switch.dispatch(&req, &mut ()), NsStatus::NOTFOUND);
	assert_eq!(calls(&beta), 0);
	let published = fx.switch.snapshot().generation();

	assert_eq!(fx.switch.dispatch(&req, &mut ()), NsStatus::SUCCESS);
	assert_eq!(calls(&beta), 1);
	assert!(fx.switch.snapshot().generation() > published);
}
