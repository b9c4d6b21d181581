// Copyright 2018-2026 the Deno authors. MIT license.

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::errno;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::NativeHandle;
use crate::resources::ResourceId;
use crate::uv::Completion;
use crate::uv::TaskKind;

impl UvBridge {
  /// Runs `work` on the blocking pool, then calls `after` on the loop with
  /// `(handle, status)`. The status is `UV_EIO` when `work` panicked.
  pub fn queue_work(
    &self,
    work: impl FnOnce() + Send + 'static,
    after: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let rid = self.register(HandleKind::Work, NativeHandle::Request);
    let record = self.lookup(rid)?;
    self.set_slot(&record, EventKind::AfterWork, after)?;
    self.uv.begin_request();
    let sink = self.uv.sink();
    self.uv.spawn(rid, TaskKind::Request, async move {
      let status = match tokio::task::spawn_blocking(work).await {
        Ok(()) => 0,
        Err(err) if err.is_cancelled() => errno::UV_ECANCELED,
        Err(err) => {
          log::debug!("work {rid} failed: {err}");
          errno::UV_EIO
        }
      };
      sink.post(Completion::AfterWork { rid, status });
    });
    record.mark_active();
    Ok(rid)
  }
}
