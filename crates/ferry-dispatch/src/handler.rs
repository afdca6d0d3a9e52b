use crate::error::HandlerError;

/// 处理一条已接受连接的外部扩展点。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - 每条连接在某个工作线程上恰好调用一次，调用期间独占该连接；
/// - 处理器只拿到 `&mut C`，借用在返回时结束，无法把连接保留到调用之外；
/// - 返回 `Err` 或 panic 都只影响当前连接：工作线程记录日志、关闭连接后继续服务；
/// - 关闭连接由工作线程负责，处理器不应自行关闭。
///
/// 任意 `Fn(&mut C) -> Result<(), HandlerError>` 闭包都实现了该 trait。
pub trait ConnectionHandler<C>: Send + Sync + 'static {
    fn handle(&self, conn: &mut C) -> Result<(), HandlerError>;
}

impl<C, F> ConnectionHandler<C> for F
where
    F: Fn(&mut C) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, conn: &mut C) -> Result<(), HandlerError> {
        self(conn)
    }
}
