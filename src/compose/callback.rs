use super::ComposeContext;
use crate::catalog::CallbackAttr;
use crate::records::CallbackRecord;
use tracing::debug;

/// One record per complete invocation of the callback
pub(crate) fn compose<A: CallbackAttr + ?Sized>(ctx: ComposeContext<'_>, attr: &A) -> Vec<CallbackRecord> {
    let key = attr.callback_key();
    let Some(handle) = ctx.catalog.resolve_callback(attr) else {
        debug!(callback = %key, "callback not in catalog");
        return Vec::new();
    };

    ctx.invocations(handle)
        .iter()
        .map(|invocation| CallbackRecord {
            callback: key.clone(),
            callback_start_timestamp: invocation.start,
            callback_end_timestamp: invocation.end,
        })
        .collect()
}
