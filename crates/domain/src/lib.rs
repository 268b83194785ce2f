//! Domain layer of the event delivery pipeline.
//!
//! Aggregates stage their events in an [`EventBuffer`]; a [`CommandExecutor`]
//! runs each command in one [`UnitOfWork`], which writes the aggregate rows,
//! the outbox rows and the event store rows in a single transaction. Staged
//! events are handed to the in-process [`EventDispatcher`] only after the
//! commit succeeded.

pub mod aggregate;
pub mod chat;
pub mod command;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod history;
pub mod order;
pub mod product;
pub mod repository;
pub mod uow;
pub mod user;

pub use aggregate::{Aggregate, DomainEvent, EventBuffer};
pub use chat::{ChatError, ChatService, CreateMessage, MarkMessageRead, Message, MessageEvent};
pub use command::{CommandExecutor, DispatchPolicy, drain_events};
pub use context::CommandContext;
pub use dispatch::{DispatchError, EventDispatcher, EventHandler};
pub use error::DomainError;
pub use event::Event;
pub use history::EventHistory;
pub use order::{
    AddItem, CancelOrder, ConfirmOrder, CreateOrder, Money, Order, OrderError, OrderEvent,
    OrderItem, OrderLine, OrderService, OrderStatus,
};
pub use product::{
    CreateProduct, Product, ProductError, ProductEvent, ProductService, RestockProduct,
};
pub use repository::{MessageRepository, OrderRepository, ProductRepository, UserRepository};
pub use uow::{
    BoxError, Fault, InMemoryDatabase, InMemoryUnitOfWork, PgUnitOfWork, PgUnitOfWorkFactory,
    TransactionState, UnitOfWork, UnitOfWorkError, UnitOfWorkExt, UnitOfWorkFactory,
};
pub use user::{
    ChangePassword, Email, PasswordHasher, RegisterUser, UpdateProfile, User, UserError,
    UserEvent, UserService,
};
