//! Access to the hosted relational store: a small PostgREST-style query
//! client and the three table repositories (users, accounts, transactions).

pub mod repository;
pub mod rest;

pub use repository::{
    AccountRepository, RestAccountRepository, RestTransactionRepository, RestUserRepository,
    TransactionRepository, UserRepository,
};
pub use rest::RestClient;
