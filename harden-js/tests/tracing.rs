use harden_js::lockdown;
use harden_js::CompartmentOptions;
use harden_js::EvaluateOptions;
use harden_js::LockdownOptions;
use harden_js::Realm;
use harden_js::VmError;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
  buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
  fn into_inner(self) -> Vec<u8> {
    match Arc::try_unwrap(self.buffer) {
      Ok(buffer) => buffer.into_inner().unwrap(),
      Err(arc) => arc.lock().unwrap().clone(),
    }
  }
}

struct SharedWriterGuard<'a> {
  buffer: &'a Arc<Mutex<Vec<u8>>>,
}

impl<'a> io::Write for SharedWriterGuard<'a> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.buffer.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<'a> MakeWriter<'a> for SharedWriter {
  type Writer = SharedWriterGuard<'a>;

  fn make_writer(&'a self) -> Self::Writer {
    SharedWriterGuard {
      buffer: &self.buffer,
    }
  }
}

fn capture(level: tracing::Level, f: impl FnOnce() -> Result<(), VmError>) -> Result<String, VmError> {
  let writer = SharedWriter::default();
  let subscriber = tracing_subscriber::fmt()
    .with_max_level(level)
    .with_ansi(false)
    .with_writer(writer.clone())
    .finish();
  let guard = tracing::subscriber::set_default(subscriber);
  f()?;
  drop(guard);
  Ok(String::from_utf8(writer.into_inner()).unwrap())
}

#[test]
fn removed_properties_are_reported() -> Result<(), VmError> {
  let output = capture(tracing::Level::INFO, || {
    let mut realm = Realm::new()?;
    realm.evaluate_script("inject.js", "Object.prototype.mallory = 1;")?;
    lockdown(&mut realm, LockdownOptions::default())?;
    Ok(())
  })?;
  assert!(
    output.contains("harden_js::validate") && output.contains("Removing intrinsics.%ObjectPrototype%.mallory"),
    "expected a removal event, got: {output}"
  );
  Ok(())
}

#[test]
fn lockdown_phases_run_inside_one_span() -> Result<(), VmError> {
  let output = capture(tracing::Level::DEBUG, || {
    let mut realm = Realm::new()?;
    lockdown(&mut realm, LockdownOptions::default())?;
    Ok(())
  })?;
  assert!(output.contains("harden_js.lockdown"), "expected lockdown span, got: {output}");
  assert!(output.contains("whitelisted intrinsics"), "{output}");
  assert!(output.contains("hardened intrinsics"), "{output}");
  Ok(())
}

#[test]
fn console_output_defaults_to_tracing_events() -> Result<(), VmError> {
  let output = capture(tracing::Level::INFO, || {
    let mut realm = Realm::new()?;
    lockdown(&mut realm, LockdownOptions::default())?;
    let endowments = realm.new_object();
    let console = realm.evaluate_script("t", "console")?;
    realm
      .heap_mut()
      .create_data_property_or_throw(endowments, "console", console)?;
    let c = realm.new_compartment(Some(endowments), CompartmentOptions::new())?;
    realm.evaluate_in(c, "console.warn('from the guest')", EvaluateOptions::new())?;
    Ok(())
  })?;
  assert!(output.contains("harden_js::console"), "{output}");
  assert!(output.contains("from the guest"), "{output}");
  Ok(())
}
