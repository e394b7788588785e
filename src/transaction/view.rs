//! Shared HTML for displaying transactions and their totals.

use maud::{Markup, html};

use crate::{
    html::{TABLE_CELL_STYLE, TABLE_HEADER_STYLE, TABLE_ROW_STYLE, format_currency},
    transaction::{Totals, Transaction, TransactionType},
};

fn amount_class(transaction_type: TransactionType) -> &'static str {
    match transaction_type {
        TransactionType::Income => "text-green-700 dark:text-green-300",
        TransactionType::Expense => "text-red-700 dark:text-red-300",
    }
}

fn remaining_class(remaining: f64) -> &'static str {
    if remaining < 0.0 {
        "text-red-700 dark:text-red-300"
    } else {
        "text-gray-900 dark:text-white"
    }
}

fn total_card(id: &str, label: &str, amount: f64, class: &str) -> Markup {
    html! {
        div class="rounded-lg bg-white p-4 shadow-sm dark:bg-gray-800"
        {
            dt class="text-sm text-gray-500 dark:text-gray-400" { (label) }
            dd id=(id) class={ "mt-1 text-2xl font-semibold " (class) }
            {
                (format_currency(amount))
            }
        }
    }
}

/// Three cards showing income, expenses and what remains.
pub(crate) fn totals_view(totals: &Totals) -> Markup {
    html! {
        dl class="grid w-full grid-cols-1 gap-4 sm:grid-cols-3"
        {
            (total_card(
                "total-income",
                "Income",
                totals.total_income,
                amount_class(TransactionType::Income),
            ))
            (total_card(
                "total-expenses",
                "Expenses",
                totals.total_expenses,
                amount_class(TransactionType::Expense),
            ))
            (total_card(
                "remaining",
                "Remaining",
                totals.remaining,
                remaining_class(totals.remaining),
            ))
        }
    }
}

fn transaction_row_view(transaction: &Transaction) -> Markup {
    let signed_amount = match transaction.transaction_type {
        TransactionType::Income => transaction.amount,
        TransactionType::Expense => -transaction.amount,
    };

    html! {
        tr class=(TABLE_ROW_STYLE) data-transaction-id=(transaction.id)
        {
            td class=(TABLE_CELL_STYLE) { (transaction.date.date()) }
            td class=(TABLE_CELL_STYLE) { (transaction.category) }
            td class=(TABLE_CELL_STYLE)
            {
                (transaction.description.as_deref().unwrap_or_default())
            }
            td class={ (TABLE_CELL_STYLE) " text-right " (amount_class(transaction.transaction_type)) }
            {
                (format_currency(signed_amount))
            }
        }
    }
}

/// A table of transactions, or a message saying there are none.
pub(crate) fn transactions_table(transactions: &[Transaction]) -> Markup {
    html! {
        div class="w-full overflow-x-auto rounded"
        {
            table class="w-full text-sm text-left rtl:text-right text-gray-500 dark:text-gray-400"
            {
                thead class=(TABLE_HEADER_STYLE)
                {
                    tr
                    {
                        th scope="col" class=(TABLE_CELL_STYLE) { "Date" }
                        th scope="col" class=(TABLE_CELL_STYLE) { "Category" }
                        th scope="col" class=(TABLE_CELL_STYLE) { "Description" }
                        th scope="col" class={ (TABLE_CELL_STYLE) " text-right" } { "Amount" }
                    }
                }

                tbody
                {
                    @for transaction in transactions {
                        (transaction_row_view(transaction))
                    }

                    @if transactions.is_empty() {
                        tr
                        {
                            td colspan="4" data-empty-state="true" class="px-6 py-4 text-center"
                            {
                                "No transactions found."
                            }
                        }
                    }
                }
            }
        }
    }
}
