//! Call Record: the central addressable resource of the runtime. Every
//! call is either an origination (`name` populated) or a reply
//! (`reply_to_id` populated), never both and never neither.

use uuid::Uuid;

use super::argument::ArgList;

/// The error attached to a reply call, distinct from the dispatcher's own
/// three-valued error channel: this is an application-level error the
/// replying peer chose to report.
#[derive(Debug, Clone)]
pub struct ReplyError {
    pub code: u32,
    pub message: String,
}

/// A call or a reply to one. `name` is non-empty iff `reply_to_id` is
/// `None`; the converse holds too. Callers build one through
/// [`CallRecord::call`] or [`CallRecord::reply`] rather than the bare
/// struct literal, so that invariant can't be constructed wrong.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_id: Uuid,
    pub reply_to_id: Option<Uuid>,
    pub name: String,
    pub args: ArgList,
    pub reply_error: Option<ReplyError>,
}

impl CallRecord {
    pub fn call(call_id: Uuid, name: impl Into<String>, args: ArgList) -> Self {
        Self {
            call_id,
            reply_to_id: None,
            name: name.into(),
            args,
            reply_error: None,
        }
    }

    pub fn reply(call_id: Uuid, reply_to_id: Uuid, args: ArgList) -> Self {
        Self {
            call_id,
            reply_to_id: Some(reply_to_id),
            name: String::new(),
            args,
            reply_error: None,
        }
    }

    pub fn reply_with_error(
        call_id: Uuid,
        reply_to_id: Uuid,
        args: ArgList,
        error: ReplyError,
    ) -> Self {
        Self {
            call_id,
            reply_to_id: Some(reply_to_id),
            name: String::new(),
            args,
            reply_error: Some(error),
        }
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to_id.is_some()
    }

    /// True if this record is a reply to some other call, whether or not
    /// it carries an error. Ported from `ARPCCall.IsResponseOrError`.
    pub fn is_response_or_error(&self) -> bool {
        self.is_reply()
    }

    /// True if this record is a reply and carries no error. Ported from
    /// `ARPCCall.IsResponseAndNotError`.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_core::model::argument::ArgList;
    /// use arpc_core::model::call::CallRecord;
    /// use uuid::Uuid;
    ///
    /// let ok_reply = CallRecord::reply(Uuid::new_v4(), Uuid::new_v4(), ArgList::default());
    /// assert!(ok_reply.is_response_and_not_error());
    /// assert!(!ok_reply.is_error());
    /// ```
    pub fn is_response_and_not_error(&self) -> bool {
        self.is_reply() && self.reply_error.is_none()
    }

    /// True if this record is a reply carrying an error. Ported from
    /// `ARPCCall.IsError`.
    pub fn is_error(&self) -> bool {
        self.is_reply() && self.reply_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_has_name_and_no_reply_to() {
        let call = CallRecord::call(Uuid::new_v4(), "Ping", ArgList::default());
        assert!(!call.is_reply());
        assert!(!call.name.is_empty());
        assert!(call.reply_to_id.is_none());
    }

    #[test]
    fn reply_has_reply_to_and_no_name() {
        let reply = CallRecord::reply(Uuid::new_v4(), Uuid::new_v4(), ArgList::default());
        assert!(reply.is_reply());
        assert!(reply.name.is_empty());
    }

    #[test]
    fn reply_with_error_is_classified_as_error() {
        let reply = CallRecord::reply_with_error(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ArgList::default(),
            ReplyError {
                code: 1,
                message: "nope".into(),
            },
        );

        assert!(reply.is_response_or_error());
        assert!(!reply.is_response_and_not_error());
        assert!(reply.is_error());
    }
}
