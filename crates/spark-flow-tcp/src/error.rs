use spark_flow::FlowError;
use std::io;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const BIND: OperationKind = OperationKind {
    code: "spark.flow.tcp.bind_failed",
    message: "tcp bind",
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "spark.flow.tcp.accept_failed",
    message: "tcp accept",
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "spark.flow.tcp.connect_failed",
    message: "tcp connect",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "spark.flow.tcp.read_failed",
    message: "tcp read",
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "spark.flow.tcp.write_failed",
    message: "tcp write",
};
pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "spark.flow.tcp.shutdown_failed",
    message: "tcp shutdown",
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "spark.flow.tcp.configure_failed",
    message: "tcp configure",
};

/// 将 IO 错误映射为 [`FlowError::Io`]，保留稳定错误码。
pub(crate) fn map_io_error(kind: OperationKind, error: io::Error) -> FlowError {
    FlowError::Io {
        code: kind.code,
        message: format!("{}: {}", kind.message, error),
    }
}

/// 套接字读写失败时的错误关闭原因文案，交给状态机的 `ErrorClosed`。
pub(crate) fn close_cause(kind: OperationKind, error: &io::Error) -> String {
    match error.kind() {
        io::ErrorKind::ConnectionReset => format!("{}: connection reset by peer", kind.message),
        io::ErrorKind::BrokenPipe => format!("{}: broken pipe", kind.message),
        _ => format!("{}: {}", kind.message, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_operation_code() {
        let err = map_io_error(
            BIND,
            io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        );
        assert_eq!(err.code(), "spark.flow.tcp.bind_failed");
        assert_eq!(err.to_string(), "tcp bind: address in use");
    }

    #[test]
    fn reset_is_described_uniformly() {
        let cause = close_cause(READ, &io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(cause, "tcp read: connection reset by peer");
    }
}
